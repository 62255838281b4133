//! Grounding filter for model explanations.
//!
//! An explanation entry survives only if it names a test or medicine the
//! extraction actually contains. Anything else is an invented finding and is
//! withheld, never shown. Surviving lab entries carry the extracted value and
//! the engine's status, whatever the model wrote there.

use super::prompt::observation_status;
use crate::intelligence::{canonicalize, RiskReport};
use crate::models::{
    parse_numeric, ClinicalExplanation, ExplanationBody, ExtractionResult, LabTestObservation,
    ParameterExplanation, RawValue,
};

/// Words on a prescription line that name a form or unit, not a drug.
const DOSAGE_FORM_WORDS: &[&str] = &[
    "tab", "tabs", "tablet", "tablets", "cap", "caps", "capsule", "capsules", "inj", "injection",
    "syp", "syrup", "susp", "suspension", "oint", "ointment", "cream", "gel", "drop", "drops",
    "sachet", "mg", "mcg", "ml", "g", "iu",
];

/// Drop ungrounded entries in place. Returns how many were withheld.
pub fn ground_explanation(
    explanation: &mut ClinicalExplanation,
    extraction: &ExtractionResult,
    risk: Option<&RiskReport>,
) -> usize {
    let withheld = match &mut explanation.body {
        ExplanationBody::ParameterAnalysis { parameter_analysis } => {
            let tests = extraction.payload.lab_tests();
            let before = parameter_analysis.len();
            parameter_analysis.retain_mut(|entry| match grounded_row(entry, tests) {
                Some(row) => {
                    entry.value = Some(row.raw_value.to_string());
                    entry.status = Some(observation_status(risk, row));
                    true
                }
                None => false,
            });
            before - parameter_analysis.len()
        }
        ExplanationBody::MedicationAnalysis {
            medication_analysis,
        } => {
            let known: Vec<Vec<String>> = extraction
                .payload
                .medications()
                .iter()
                .map(|m| drug_words(&m.name))
                .filter(|words| !words.is_empty())
                .collect();
            let before = medication_analysis.len();
            medication_analysis.retain(|m| drug_matches(&drug_words(&m.medicine_name), &known));
            before - medication_analysis.len()
        }
        ExplanationBody::General { .. } => 0,
    };

    if withheld > 0 {
        tracing::warn!(
            withheld,
            "Explanation entries withheld: not present in extraction"
        );
    }
    explanation.withheld_entries += withheld;
    withheld
}

/// Extraction row an entry talks about. A value the model states must match
/// one of the rows for that test, otherwise the entry is invented.
fn grounded_row<'a>(
    entry: &ParameterExplanation,
    tests: &'a [LabTestObservation],
) -> Option<&'a LabTestObservation> {
    let canonical = canonicalize(&entry.test_name);
    let mut rows = tests
        .iter()
        .filter(|t| canonicalize(&t.test_name) == canonical);
    match entry.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => rows.next(),
        Some(stated) => rows.find(|t| values_agree(stated, &t.raw_value)),
    }
}

fn values_agree(stated: &str, extracted: &RawValue) -> bool {
    match (parse_numeric(stated), extracted.numeric()) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-9,
        _ => stated.eq_ignore_ascii_case(&extracted.to_string()),
    }
}

fn drug_words(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !DOSAGE_FORM_WORDS.contains(&w.as_str()))
        .collect()
}

/// Every drug word of the candidate appears on one prescribed line:
/// "Metformin" matches "Tab. Metformin 500", "in" and "Tab" match nothing.
fn drug_matches(candidate: &[String], known: &[Vec<String>]) -> bool {
    !candidate.is_empty()
        && known
            .iter()
            .any(|line| candidate.iter().all(|w| line.contains(w)))
}
