//! Clinical pattern flags and tier guidance.
//!
//! A pattern flag says "several related tests are off together". It never
//! names a condition as present; the explanation stage may only describe it.

use std::collections::BTreeMap;

use crate::models::{RiskLevel, Severity};

/// Flag name, member canonical tests, and the non-normal count that raises it
/// (`None` uses the configured default).
const PATTERNS: &[(&str, &[&str], Option<usize>)] = &[
    (
        "anemia_pattern",
        &["Hemoglobin", "Hematocrit", "RBC Count", "MCV", "MCH", "MCHC", "RDW", "Iron", "Ferritin"],
        None,
    ),
    (
        "glycemic_pattern",
        &["Fasting Glucose", "Postprandial Glucose", "Random Glucose", "Glucose", "HbA1c"],
        Some(1),
    ),
    ("renal_pattern", &["Creatinine", "Urea", "BUN", "Uric Acid", "eGFR"], None),
    (
        "hepatic_pattern",
        &["SGPT", "SGOT", "ALP", "GGT", "Total Bilirubin", "Direct Bilirubin", "Albumin"],
        None,
    ),
    ("infection_pattern", &["WBC Count", "Neutrophils", "Lymphocytes", "CRP", "ESR"], None),
    ("thyroid_pattern", &["TSH", "T3", "T4", "Free T3", "Free T4"], None),
    ("lipid_pattern", &["Total Cholesterol", "LDL", "HDL", "Triglycerides", "VLDL"], None),
    (
        "electrolyte_pattern",
        &["Sodium", "Potassium", "Chloride", "Calcium", "Magnesium", "Phosphorus"],
        None,
    ),
    ("coagulation_pattern", &["PT", "INR", "aPTT", "Platelet Count"], None),
];

/// Evaluate every pattern over `(canonical_name, severity)` pairs.
///
/// All pattern names are always present so the flag set is stable.
pub fn evaluate_patterns(
    classified: &[(String, Severity)],
    default_min: usize,
) -> BTreeMap<String, bool> {
    PATTERNS
        .iter()
        .map(|(flag, members, min)| {
            let hits = classified
                .iter()
                .filter(|(name, sev)| *sev != Severity::Normal && members.contains(&name.as_str()))
                .count();
            let needed = min.unwrap_or(default_min).max(1);
            (flag.to_string(), hits >= needed)
        })
        .collect()
}

/// Fixed, non-diagnostic guidance for a risk tier.
pub fn tier_recommendations(level: RiskLevel) -> Vec<String> {
    let lines: &[&str] = match level {
        RiskLevel::Critical => &[
            "Seek immediate medical attention for the critical values in this report.",
            "Share this report with your doctor today.",
        ],
        RiskLevel::High => &[
            "Consult your doctor soon to review the abnormal results.",
            "Ask whether repeat or confirmatory testing is needed.",
        ],
        RiskLevel::Moderate => &[
            "Discuss the highlighted results at your next doctor visit.",
            "Consider repeat testing as advised by your doctor.",
        ],
        RiskLevel::Low => &["Continue routine check-ups as advised by your doctor."],
    };
    lines.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(items: &[(&str, Severity)]) -> Vec<(String, Severity)> {
        items.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    #[test]
    fn every_pattern_reported() {
        let flags = evaluate_patterns(&[], 2);
        assert_eq!(flags.len(), PATTERNS.len());
        assert!(flags.values().all(|v| !v));
    }

    #[test]
    fn anemia_needs_two_indicators() {
        let one = classified(&[("Hemoglobin", Severity::Abnormal)]);
        assert!(!evaluate_patterns(&one, 2)["anemia_pattern"]);

        let two = classified(&[("Hemoglobin", Severity::Abnormal), ("MCV", Severity::Critical)]);
        assert!(evaluate_patterns(&two, 2)["anemia_pattern"]);
    }

    #[test]
    fn glycemic_needs_one() {
        let one = classified(&[("Fasting Glucose", Severity::Abnormal)]);
        assert!(evaluate_patterns(&one, 2)["glycemic_pattern"]);
    }

    #[test]
    fn normal_members_ignored() {
        let items = classified(&[("Creatinine", Severity::Normal), ("Urea", Severity::Normal)]);
        assert!(!evaluate_patterns(&items, 2)["renal_pattern"]);
    }

    #[test]
    fn configured_minimum_applies() {
        let one = classified(&[("TSH", Severity::Abnormal)]);
        assert!(evaluate_patterns(&one, 1)["thyroid_pattern"]);
    }

    #[test]
    fn recommendations_per_tier() {
        assert!(tier_recommendations(RiskLevel::Critical)[0].contains("immediate"));
        assert_eq!(tier_recommendations(RiskLevel::Low).len(), 1);
    }
}
