//! Reference-range parsing and the standard adult range table.
//!
//! Parsing never fails: an unreadable range yields unbounded
//! [`ReferenceBounds`] and the caller treats the observation as
//! unclassifiable.

use std::sync::LazyLock;

use regex::Regex;

use super::types::ReferenceBounds;
use crate::models::Sex;

static RE_COMPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(<=|>=|≤|≥|<|>|up\s*to|less\s+than|below|more\s+than|greater\s+than|above)\s*(\d+(?:\.\d+)?|\.\d+)",
    )
    .unwrap()
});

static RE_BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?|\.\d+)\s*(?:-|–|—|to)\s*(\d+(?:\.\d+)?|\.\d+)").unwrap()
});

/// Parse a free-text reference range.
///
/// Accepts "12-16", "12 - 16 mg/dL", "12–16", "12 to 16", "150,000 - 400,000",
/// and comparator forms "<5", ">40", "≤5", "≥40", "Upto 200", "less than 5".
pub fn parse_reference_range(text: &str) -> ReferenceBounds {
    let cleaned = text.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return ReferenceBounds::default();
    }

    if let Some(caps) = RE_COMPARATOR.captures(cleaned) {
        let Ok(bound) = caps[2].parse::<f64>() else {
            return ReferenceBounds::default();
        };
        let op = caps[1].to_lowercase();
        let is_upper = op.starts_with('<')
            || op == "≤"
            || op.starts_with("up")
            || op.starts_with("less")
            || op == "below";
        return if is_upper {
            ReferenceBounds::below(bound)
        } else {
            ReferenceBounds::above(bound)
        };
    }

    if let Some(caps) = RE_BETWEEN.captures(cleaned) {
        let (Ok(a), Ok(b)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
            return ReferenceBounds::default();
        };
        return if a <= b {
            ReferenceBounds::between(a, b)
        } else {
            ReferenceBounds::between(b, a)
        };
    }

    ReferenceBounds::default()
}

// ──────────────────────────────────────────────
// Standard ranges
// ──────────────────────────────────────────────

/// General adult range for a canonical test, with optional sex overrides.
#[derive(Debug, Clone, Copy)]
pub struct StandardRange {
    pub canonical: &'static str,
    pub lower: f64,
    pub upper: f64,
    pub unit: &'static str,
    pub male: Option<(f64, f64)>,
    pub female: Option<(f64, f64)>,
}

const fn range(canonical: &'static str, lower: f64, upper: f64, unit: &'static str) -> StandardRange {
    StandardRange {
        canonical,
        lower,
        upper,
        unit,
        male: None,
        female: None,
    }
}

const fn sexed(
    canonical: &'static str,
    lower: f64,
    upper: f64,
    unit: &'static str,
    male: (f64, f64),
    female: (f64, f64),
) -> StandardRange {
    StandardRange {
        canonical,
        lower,
        upper,
        unit,
        male: Some(male),
        female: Some(female),
    }
}

/// Ranges vary by laboratory; these are general adult values.
const STANDARD_RANGES: &[StandardRange] = &[
    sexed("Hemoglobin", 12.0, 17.0, "g/dL", (13.5, 17.5), (12.0, 16.0)),
    range("Hematocrit", 36.0, 52.0, "%"),
    range("RBC Count", 4.0, 6.0, "million/µL"),
    range("WBC Count", 4_500.0, 11_000.0, "cells/µL"),
    range("Platelet Count", 150_000.0, 400_000.0, "cells/µL"),
    range("MCV", 80.0, 100.0, "fL"),
    range("MCH", 27.0, 33.0, "pg"),
    range("MCHC", 32.0, 36.0, "g/dL"),
    range("RDW", 11.5, 14.5, "%"),
    range("Neutrophils", 40.0, 70.0, "%"),
    range("Lymphocytes", 20.0, 40.0, "%"),
    range("Monocytes", 2.0, 8.0, "%"),
    range("Eosinophils", 1.0, 4.0, "%"),
    range("Basophils", 0.0, 1.0, "%"),
    range("Fasting Glucose", 70.0, 100.0, "mg/dL"),
    range("Random Glucose", 70.0, 140.0, "mg/dL"),
    range("Postprandial Glucose", 70.0, 140.0, "mg/dL"),
    range("HbA1c", 4.0, 5.6, "%"),
    sexed("Creatinine", 0.6, 1.2, "mg/dL", (0.7, 1.3), (0.6, 1.1)),
    range("BUN", 7.0, 20.0, "mg/dL"),
    range("Urea", 15.0, 45.0, "mg/dL"),
    sexed("Uric Acid", 2.5, 7.0, "mg/dL", (3.5, 7.2), (2.5, 6.0)),
    range("SGPT", 0.0, 40.0, "U/L"),
    range("SGOT", 0.0, 40.0, "U/L"),
    range("ALP", 44.0, 147.0, "U/L"),
    range("GGT", 0.0, 60.0, "U/L"),
    range("Total Bilirubin", 0.1, 1.2, "mg/dL"),
    range("Direct Bilirubin", 0.0, 0.3, "mg/dL"),
    range("Albumin", 3.5, 5.0, "g/dL"),
    range("Total Protein", 6.0, 8.3, "g/dL"),
    range("Total Cholesterol", 0.0, 200.0, "mg/dL"),
    range("HDL", 40.0, 60.0, "mg/dL"),
    range("LDL", 0.0, 100.0, "mg/dL"),
    range("Triglycerides", 0.0, 150.0, "mg/dL"),
    range("VLDL", 5.0, 40.0, "mg/dL"),
    range("TSH", 0.4, 4.0, "mIU/L"),
    range("T3", 80.0, 200.0, "ng/dL"),
    range("T4", 5.0, 12.0, "µg/dL"),
    range("Free T3", 2.3, 4.2, "pg/mL"),
    range("Free T4", 0.8, 1.8, "ng/dL"),
    range("Sodium", 136.0, 145.0, "mEq/L"),
    range("Potassium", 3.5, 5.0, "mEq/L"),
    range("Chloride", 98.0, 106.0, "mEq/L"),
    range("Calcium", 8.5, 10.5, "mg/dL"),
    range("Magnesium", 1.5, 2.5, "mg/dL"),
    range("Phosphorus", 2.5, 4.5, "mg/dL"),
    range("Troponin", 0.0, 0.04, "ng/mL"),
    range("CRP", 0.0, 3.0, "mg/L"),
    sexed("ESR", 0.0, 20.0, "mm/hr", (0.0, 15.0), (0.0, 20.0)),
    range("PT", 11.0, 13.5, "seconds"),
    range("INR", 0.8, 1.1, ""),
    range("aPTT", 30.0, 40.0, "seconds"),
    range("Vitamin D", 30.0, 100.0, "ng/mL"),
    range("Vitamin B12", 200.0, 900.0, "pg/mL"),
    range("Folate", 3.0, 17.0, "ng/mL"),
    sexed("Iron", 60.0, 170.0, "µg/dL", (65.0, 175.0), (50.0, 170.0)),
    sexed("Ferritin", 12.0, 300.0, "ng/mL", (24.0, 336.0), (11.0, 307.0)),
];

pub fn standard_range(canonical: &str) -> Option<&'static StandardRange> {
    STANDARD_RANGES.iter().find(|r| r.canonical == canonical)
}

/// Standard bounds for a canonical test, sex-specific where known.
pub fn standard_bounds(canonical: &str, sex: Option<Sex>) -> Option<ReferenceBounds> {
    let entry = standard_range(canonical)?;
    let (lower, upper) = match sex {
        Some(Sex::Male) => entry.male,
        Some(Sex::Female) => entry.female,
        None => None,
    }
    .unwrap_or((entry.lower, entry.upper));
    Some(ReferenceBounds::between(lower, upper))
}
