//! Stage 4 parsing and the deterministic explanation used when no model
//! answer is usable.

use serde::Deserialize;

use super::parser::{extract_json_value, ParseFailure};
use crate::intelligence::RiskReport;
use crate::models::{
    de, ClinicalExplanation, Confidence, DocumentType, ExplanationBody, ExplanationSource,
    ExtractionPayload, ExtractionResult, MedicationExplanation, ParameterExplanation,
    DEFAULT_DISCLAIMER,
};

#[derive(Debug, Deserialize)]
struct RawExplanation {
    #[serde(
        default,
        alias = "clinical_summary",
        alias = "summary",
        deserialize_with = "de::string_or_empty"
    )]
    overall_summary: String,
    #[serde(
        default,
        alias = "abnormal_findings_explanation",
        deserialize_with = "de::lenient_vec"
    )]
    parameter_analysis: Vec<ParameterExplanation>,
    #[serde(default, alias = "medications", deserialize_with = "de::lenient_vec")]
    medication_analysis: Vec<MedicationExplanation>,
    #[serde(default, deserialize_with = "de::string_list")]
    key_points: Vec<String>,
    #[serde(
        default,
        alias = "risk_level_justification",
        deserialize_with = "de::opt_string"
    )]
    risk_explanation: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    recommendations: Vec<String>,
    #[serde(default, alias = "follow_up_tests", deserialize_with = "de::string_list")]
    follow_up: Vec<String>,
}

/// Parse a model explanation. `risk_level` comes from `risk`, never the model.
pub fn parse_explanation(
    response: &str,
    document_type: DocumentType,
    risk: Option<&RiskReport>,
    source: ExplanationSource,
) -> Result<ClinicalExplanation, ParseFailure> {
    let value = extract_json_value(response)?;
    let raw: RawExplanation =
        serde_json::from_value(value).map_err(|e| ParseFailure::WrongShape(e.to_string()))?;

    let body = match document_type {
        DocumentType::LabReport => ExplanationBody::ParameterAnalysis {
            parameter_analysis: raw.parameter_analysis,
        },
        DocumentType::Prescription => ExplanationBody::MedicationAnalysis {
            medication_analysis: raw.medication_analysis,
        },
        DocumentType::Other => ExplanationBody::General {
            key_points: raw.key_points,
        },
    };

    if raw.overall_summary.is_empty() && body.entry_count() == 0 {
        return Err(ParseFailure::WrongShape("empty explanation".into()));
    }

    let recommendations = if raw.recommendations.is_empty() {
        risk.map(|r| r.recommendations.clone()).unwrap_or_default()
    } else {
        raw.recommendations
    };

    Ok(ClinicalExplanation {
        overall_summary: raw.overall_summary,
        body,
        risk_level: risk.map(|r| r.risk_level),
        risk_explanation: raw.risk_explanation,
        recommendations,
        follow_up: raw.follow_up,
        disclaimer: DEFAULT_DISCLAIMER.to_string(),
        confidence: Confidence::Medium,
        parse_error: false,
        source,
        withheld_entries: 0,
    })
}

/// Explanation assembled from the risk report and extraction alone.
///
/// Used when the model answer is unparseable (`parse_error = true`) or when
/// every provider is exhausted.
pub fn deterministic_explanation(
    extraction: &ExtractionResult,
    risk: Option<&RiskReport>,
    parse_error: bool,
) -> ClinicalExplanation {
    let (overall_summary, body) = match &extraction.payload {
        ExtractionPayload::LabReport(_) => {
            let summary = risk
                .map(|r| r.summary.clone())
                .unwrap_or_else(|| "No lab values could be read from this report.".to_string());
            let parameter_analysis = risk
                .map(|r| {
                    r.findings()
                        .map(|f| {
                            let value = match &f.unit {
                                Some(unit) => format!("{} {unit}", f.value),
                                None => f.value.to_string(),
                            };
                            ParameterExplanation {
                                test_name: f.test_name.clone(),
                                value: Some(value),
                                status: Some(format!("{} {}", f.severity, f.direction)),
                                clinical_meaning: f.message.clone(),
                                possible_causes: Vec::new(),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            (
                summary,
                ExplanationBody::ParameterAnalysis { parameter_analysis },
            )
        }
        ExtractionPayload::Prescription(data) => {
            let medication_analysis: Vec<MedicationExplanation> = data
                .medications
                .iter()
                .map(|m| {
                    let how: Vec<&str> = [&m.dosage, &m.frequency, &m.duration, &m.instructions]
                        .into_iter()
                        .filter_map(|s| s.as_deref())
                        .collect();
                    MedicationExplanation {
                        medicine_name: m.name.clone(),
                        purpose: None,
                        how_to_take: (!how.is_empty()).then(|| how.join(", ")),
                        side_effects: Vec::new(),
                        precautions: Vec::new(),
                    }
                })
                .collect();
            let summary = match medication_analysis.len() {
                0 => "No medicines could be read from this prescription.".to_string(),
                1 => "This prescription lists 1 medicine.".to_string(),
                n => format!("This prescription lists {n} medicines."),
            };
            (
                summary,
                ExplanationBody::MedicationAnalysis {
                    medication_analysis,
                },
            )
        }
        ExtractionPayload::Other(data) => (
            data.summary
                .clone()
                .unwrap_or_else(|| "This document was processed without a detailed explanation.".to_string()),
            ExplanationBody::General {
                key_points: data.key_points.clone(),
            },
        ),
    };

    ClinicalExplanation {
        overall_summary,
        body,
        risk_level: risk.map(|r| r.risk_level),
        risk_explanation: risk
            .filter(|r| !r.justification.is_empty())
            .map(|r| r.justification.join(" ")),
        recommendations: risk.map(|r| r.recommendations.clone()).unwrap_or_default(),
        follow_up: Vec::new(),
        disclaimer: DEFAULT_DISCLAIMER.to_string(),
        confidence: Confidence::Low,
        parse_error,
        source: ExplanationSource::Deterministic,
        withheld_entries: 0,
    }
}
