//! Test-name canonicalization and organ-system lookup.
//!
//! Labs print the same analyte under many names ("Hb", "HGB", "Haemoglobin").
//! Both the risk engine and the trend aggregator key on the canonical name
//! produced here, so a report's findings and its trend lines always agree.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::OrganSystem;

/// Canonical name, organ system, and lower-case aliases.
///
/// The canonical name's own lower-case form is always an alias implicitly.
const CANON_TABLE: &[(&str, OrganSystem, &[&str])] = &[
    // Hematology
    ("Hemoglobin", OrganSystem::Hematologic, &["hb", "hgb", "haemoglobin", "hb%", "hemoglobin (hb)", "haemoglobin (hb)"]),
    ("Hematocrit", OrganSystem::Hematologic, &["hct", "pcv", "haematocrit", "packed cell volume"]),
    ("RBC Count", OrganSystem::Hematologic, &["rbc", "total rbc count", "red blood cell count", "red blood cells", "erythrocyte count"]),
    ("MCV", OrganSystem::Hematologic, &["mean corpuscular volume"]),
    ("MCH", OrganSystem::Hematologic, &["mean corpuscular hemoglobin", "mean corpuscular haemoglobin"]),
    ("MCHC", OrganSystem::Hematologic, &["mean corpuscular hemoglobin concentration", "mean corpuscular haemoglobin concentration"]),
    ("RDW", OrganSystem::Hematologic, &["rdw-cv", "rdw cv", "red cell distribution width"]),
    ("Platelet Count", OrganSystem::Coagulation, &["plt", "platelets", "platelet", "thrombocyte count"]),
    // Immune / inflammatory
    ("WBC Count", OrganSystem::Immune, &["wbc", "tlc", "total wbc count", "total leucocyte count", "total leukocyte count", "white blood cell count", "white blood cells"]),
    ("Neutrophils", OrganSystem::Immune, &["neutrophil", "polymorphs", "neutrophils %"]),
    ("Lymphocytes", OrganSystem::Immune, &["lymphocyte", "lymphocytes %"]),
    ("Monocytes", OrganSystem::Immune, &["monocyte"]),
    ("Eosinophils", OrganSystem::Immune, &["eosinophil"]),
    ("Basophils", OrganSystem::Immune, &["basophil"]),
    ("ESR", OrganSystem::Immune, &["erythrocyte sedimentation rate"]),
    ("CRP", OrganSystem::Immune, &["c-reactive protein", "c reactive protein", "hs-crp", "hscrp"]),
    // Metabolic
    ("Fasting Glucose", OrganSystem::Metabolic, &["fbs", "fasting blood sugar", "glucose fasting", "glucose (fasting)", "fasting plasma glucose", "fpg"]),
    ("Postprandial Glucose", OrganSystem::Metabolic, &["ppbs", "post prandial blood sugar", "postprandial blood sugar", "glucose pp", "glucose (pp)", "post prandial glucose"]),
    ("Random Glucose", OrganSystem::Metabolic, &["rbs", "random blood sugar", "glucose random", "glucose (random)"]),
    ("Glucose", OrganSystem::Metabolic, &["blood glucose", "blood sugar", "plasma glucose", "serum glucose"]),
    ("HbA1c", OrganSystem::Metabolic, &["a1c", "glycated hemoglobin", "glycosylated hemoglobin", "glycated haemoglobin", "hemoglobin a1c"]),
    // Renal
    ("Creatinine", OrganSystem::Renal, &["serum creatinine", "creat", "s. creatinine", "s.creatinine"]),
    ("Urea", OrganSystem::Renal, &["blood urea", "serum urea"]),
    ("BUN", OrganSystem::Renal, &["blood urea nitrogen", "urea nitrogen"]),
    ("Uric Acid", OrganSystem::Renal, &["serum uric acid", "s. uric acid"]),
    ("eGFR", OrganSystem::Renal, &["gfr", "estimated gfr"]),
    // Hepatic
    ("SGPT", OrganSystem::Hepatic, &["alt", "sgpt (alt)", "alt (sgpt)", "alanine aminotransferase", "alanine transaminase"]),
    ("SGOT", OrganSystem::Hepatic, &["ast", "sgot (ast)", "ast (sgot)", "aspartate aminotransferase", "aspartate transaminase"]),
    ("ALP", OrganSystem::Hepatic, &["alkaline phosphatase"]),
    ("GGT", OrganSystem::Hepatic, &["gamma gt", "ggtp", "gamma glutamyl transferase"]),
    ("Total Bilirubin", OrganSystem::Hepatic, &["bilirubin", "bilirubin total", "serum bilirubin", "s. bilirubin"]),
    ("Direct Bilirubin", OrganSystem::Hepatic, &["bilirubin direct", "conjugated bilirubin"]),
    ("Albumin", OrganSystem::Hepatic, &["serum albumin"]),
    ("Total Protein", OrganSystem::Hepatic, &["protein total", "serum protein"]),
    // Lipids / cardiac
    ("Total Cholesterol", OrganSystem::Cardiovascular, &["cholesterol", "cholesterol total", "serum cholesterol"]),
    ("HDL", OrganSystem::Cardiovascular, &["hdl cholesterol", "hdl-c", "hdl-cholesterol"]),
    ("LDL", OrganSystem::Cardiovascular, &["ldl cholesterol", "ldl-c", "ldl-cholesterol"]),
    ("VLDL", OrganSystem::Cardiovascular, &["vldl cholesterol"]),
    ("Triglycerides", OrganSystem::Cardiovascular, &["tg", "triglyceride", "serum triglycerides"]),
    ("Troponin", OrganSystem::Cardiovascular, &["troponin i", "troponin t", "trop i", "trop t"]),
    // Thyroid
    ("TSH", OrganSystem::Endocrine, &["thyroid stimulating hormone"]),
    ("T3", OrganSystem::Endocrine, &["total t3", "triiodothyronine"]),
    ("T4", OrganSystem::Endocrine, &["total t4", "thyroxine"]),
    ("Free T3", OrganSystem::Endocrine, &["ft3"]),
    ("Free T4", OrganSystem::Endocrine, &["ft4"]),
    // Electrolytes
    ("Sodium", OrganSystem::Electrolyte, &["na", "na+", "serum sodium", "s. sodium"]),
    ("Potassium", OrganSystem::Electrolyte, &["k", "k+", "serum potassium", "s. potassium"]),
    ("Chloride", OrganSystem::Electrolyte, &["cl", "cl-", "serum chloride"]),
    ("Calcium", OrganSystem::Electrolyte, &["ca", "serum calcium", "total calcium"]),
    ("Magnesium", OrganSystem::Electrolyte, &["mg", "serum magnesium"]),
    ("Phosphorus", OrganSystem::Electrolyte, &["phosphate", "serum phosphorus", "inorganic phosphorus"]),
    // Coagulation
    ("PT", OrganSystem::Coagulation, &["prothrombin time"]),
    ("INR", OrganSystem::Coagulation, &["pt-inr", "pt inr"]),
    ("aPTT", OrganSystem::Coagulation, &["ptt", "activated partial thromboplastin time"]),
    // Nutritional
    ("Vitamin D", OrganSystem::Nutritional, &["25-oh vitamin d", "vitamin d3", "25 hydroxy vitamin d", "vit d"]),
    ("Vitamin B12", OrganSystem::Nutritional, &["b12", "vit b12", "cobalamin"]),
    ("Iron", OrganSystem::Nutritional, &["serum iron"]),
    ("Ferritin", OrganSystem::Nutritional, &["serum ferritin"]),
    ("Folate", OrganSystem::Nutritional, &["folic acid", "serum folate"]),
];

struct CanonEntry {
    canonical: &'static str,
    organ: OrganSystem,
}

static ALIAS_INDEX: LazyLock<HashMap<String, CanonEntry>> = LazyLock::new(|| {
    let mut index = HashMap::new();
    for (canonical, organ, aliases) in CANON_TABLE {
        let entry = || CanonEntry {
            canonical: *canonical,
            organ: *organ,
        };
        index.insert(canonical.to_lowercase(), entry());
        for alias in *aliases {
            index.insert((*alias).to_string(), entry());
        }
    }
    index
});

static CANONICAL_ORGANS: LazyLock<HashMap<&'static str, OrganSystem>> = LazyLock::new(|| {
    CANON_TABLE
        .iter()
        .map(|(canonical, organ, _)| (*canonical, *organ))
        .collect()
});

/// Lower-case, trim, collapse whitespace, drop trailing report punctuation.
fn lookup_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['*', ':', '.'])
        .trim()
        .to_lowercase()
}

/// Canonical test name. Unknown names pass through trimmed.
pub fn canonicalize(name: &str) -> String {
    let key = lookup_key(name);
    match ALIAS_INDEX.get(&key) {
        Some(entry) => entry.canonical.to_string(),
        None => name.trim().to_string(),
    }
}

/// Organ system for a raw or canonical test name.
pub fn organ_system_for(name: &str) -> OrganSystem {
    if let Some(organ) = CANONICAL_ORGANS.get(name) {
        return *organ;
    }
    ALIAS_INDEX
        .get(&lookup_key(name))
        .map(|e| e.organ)
        .unwrap_or(OrganSystem::Other)
}

/// True when two raw names denote the same analyte.
pub fn same_test(a: &str, b: &str) -> bool {
    canonicalize(a) == canonicalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hemoglobin_spellings_collapse() {
        for name in ["Hb", "HB", "Hemoglobin", " hemoglobin ", "HGB", "Haemoglobin"] {
            assert_eq!(canonicalize(name), "Hemoglobin", "{name:?}");
        }
    }

    #[test]
    fn liver_enzymes() {
        assert_eq!(canonicalize("ALT"), "SGPT");
        assert_eq!(canonicalize("SGPT (ALT)"), "SGPT");
        assert_eq!(canonicalize("Aspartate Aminotransferase"), "SGOT");
    }

    #[test]
    fn trailing_punctuation_and_spacing() {
        assert_eq!(canonicalize("Serum   Creatinine:"), "Creatinine");
        assert_eq!(canonicalize("Platelet Count*"), "Platelet Count");
    }

    #[test]
    fn unknown_names_pass_through_trimmed() {
        assert_eq!(canonicalize("  Lipase  "), "Lipase");
    }

    #[test]
    fn organ_lookup() {
        assert_eq!(organ_system_for("Hemoglobin"), OrganSystem::Hematologic);
        assert_eq!(organ_system_for("urea"), OrganSystem::Renal);
        assert_eq!(organ_system_for("SGOT"), OrganSystem::Hepatic);
        assert_eq!(organ_system_for("Glucose"), OrganSystem::Metabolic);
        assert_eq!(organ_system_for("Lipase"), OrganSystem::Other);
    }

    #[test]
    fn same_test_across_aliases() {
        assert!(same_test("TLC", "White Blood Cells"));
        assert!(!same_test("HDL", "LDL"));
    }

    #[test]
    fn aliases_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (canonical, _, aliases) in CANON_TABLE {
            assert!(seen.insert(canonical.to_lowercase()), "{canonical}");
            for alias in *aliases {
                assert!(seen.insert(alias.to_string()), "{alias}");
            }
        }
    }
}
