use serde::{Deserialize, Serialize};

use super::de;
use super::enums::{Confidence, ExplanationSource, RiskLevel};

pub const DEFAULT_DISCLAIMER: &str = "This explanation is for general understanding only and is \
not a medical diagnosis. Please discuss these results with a qualified healthcare professional.";

/// Plain-language reading of one lab parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterExplanation {
    #[serde(alias = "parameter", alias = "test", deserialize_with = "de::string_or_empty")]
    pub test_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub status: Option<String>,
    #[serde(
        default,
        alias = "meaning",
        alias = "explanation",
        deserialize_with = "de::string_or_empty"
    )]
    pub clinical_meaning: String,
    #[serde(default, deserialize_with = "de::string_list")]
    pub possible_causes: Vec<String>,
}

/// Plain-language reading of one prescribed medicine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicationExplanation {
    #[serde(alias = "name", alias = "medication", deserialize_with = "de::string_or_empty")]
    pub medicine_name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub purpose: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub how_to_take: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub side_effects: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub precautions: Vec<String>,
}

/// Document-specific part of an explanation, mirroring the extraction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplanationBody {
    MedicationAnalysis {
        medication_analysis: Vec<MedicationExplanation>,
    },
    ParameterAnalysis {
        parameter_analysis: Vec<ParameterExplanation>,
    },
    General {
        key_points: Vec<String>,
    },
}

impl ExplanationBody {
    pub fn parameters(&self) -> &[ParameterExplanation] {
        match self {
            Self::ParameterAnalysis { parameter_analysis } => parameter_analysis,
            _ => &[],
        }
    }

    pub fn entry_count(&self) -> usize {
        match self {
            Self::MedicationAnalysis { medication_analysis } => medication_analysis.len(),
            Self::ParameterAnalysis { parameter_analysis } => parameter_analysis.len(),
            Self::General { key_points } => key_points.len(),
        }
    }
}

/// Explanation of an already-computed risk report and extraction.
///
/// `risk_level` is always copied from the risk report, never taken from model
/// output. `withheld_entries` counts model entries dropped because they named
/// a test or medicine absent from the extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalExplanation {
    pub overall_summary: String,
    pub body: ExplanationBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_explanation: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub follow_up: Vec<String>,
    pub disclaimer: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub parse_error: bool,
    pub source: ExplanationSource,
    #[serde(default)]
    pub withheld_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameter_aliases() {
        let p: ParameterExplanation = serde_json::from_value(json!({
            "parameter": "Hemoglobin",
            "value": 9.0,
            "meaning": "Carries oxygen in the blood.",
            "possible_causes": ["Iron deficiency", null]
        }))
        .unwrap();
        assert_eq!(p.test_name, "Hemoglobin");
        assert_eq!(p.value.as_deref(), Some("9.0"));
        assert_eq!(p.possible_causes.len(), 1);
    }

    #[test]
    fn body_tagged_by_kind() {
        let body = ExplanationBody::General {
            key_points: vec!["a".into()],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["kind"], "general");
        assert_eq!(body.entry_count(), 1);
        assert!(body.parameters().is_empty());
    }
}
