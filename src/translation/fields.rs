//! Declarative map of human-facing text fields.
//!
//! A path is a dot-separated list of JSON keys over the serialized value. A
//! key ending in `[]` walks every element of that array. Numeric values,
//! units, test names and codes are deliberately absent: only prose is listed.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::intelligence::RiskReport;
use crate::models::{ClinicalExplanation, ExtractionResult};
use crate::pipeline::AnalysisOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single string.
    ScalarText,
    /// An array of strings.
    TextArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub path: &'static str,
    pub kind: FieldKind,
}

const fn text(path: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        path,
        kind: FieldKind::ScalarText,
    }
}

const fn list(path: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        path,
        kind: FieldKind::TextArray,
    }
}

pub const EXTRACTION_FIELDS: &[FieldDescriptor] = &[
    // prescription
    text("payload.diagnosis"),
    text("payload.medications[].frequency"),
    text("payload.medications[].duration"),
    text("payload.medications[].instructions"),
    list("payload.additional_instructions"),
    // other
    text("payload.title"),
    text("payload.summary"),
    list("payload.key_points"),
];

pub const EXPLANATION_FIELDS: &[FieldDescriptor] = &[
    text("overall_summary"),
    text("risk_explanation"),
    list("recommendations"),
    list("follow_up"),
    text("disclaimer"),
    text("body.parameter_analysis[].status"),
    text("body.parameter_analysis[].clinical_meaning"),
    list("body.parameter_analysis[].possible_causes"),
    text("body.medication_analysis[].purpose"),
    text("body.medication_analysis[].how_to_take"),
    list("body.medication_analysis[].side_effects"),
    list("body.medication_analysis[].precautions"),
    list("body.key_points"),
];

pub const RISK_FIELDS: &[FieldDescriptor] = &[
    text("summary"),
    list("justification"),
    list("recommendations"),
    text("critical_findings[].message"),
    text("abnormal_findings[].message"),
];

pub const DECISION_FIELDS: &[FieldDescriptor] = &[text("reasoning")];

/// A value whose prose fields the cascade knows how to find.
///
/// `SECTIONS` pairs a path prefix with the descriptors under it, so composite
/// results reuse the descriptor lists of their parts.
pub trait Translatable: Serialize + DeserializeOwned + Clone {
    const SECTIONS: &'static [(&'static str, &'static [FieldDescriptor])];
}

impl Translatable for ExtractionResult {
    const SECTIONS: &'static [(&'static str, &'static [FieldDescriptor])] =
        &[("", EXTRACTION_FIELDS)];
}

impl Translatable for ClinicalExplanation {
    const SECTIONS: &'static [(&'static str, &'static [FieldDescriptor])] =
        &[("", EXPLANATION_FIELDS)];
}

impl Translatable for RiskReport {
    const SECTIONS: &'static [(&'static str, &'static [FieldDescriptor])] = &[("", RISK_FIELDS)];
}

impl Translatable for AnalysisOutcome {
    const SECTIONS: &'static [(&'static str, &'static [FieldDescriptor])] = &[
        ("type_decision", DECISION_FIELDS),
        ("extraction", EXTRACTION_FIELDS),
        ("risk", RISK_FIELDS),
        ("explanation", EXPLANATION_FIELDS),
    ];
}

/// Split a descriptor path into `(key, iterate_array)` segments.
pub(crate) fn segments<'a>(prefix: &'a str, path: &'a str) -> Vec<(&'a str, bool)> {
    prefix
        .split('.')
        .chain(path.split('.'))
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (s, false),
        })
        .collect()
}
