use serde_json::Value;

use super::parser::extract_json_value;
use crate::models::{Confidence, DocumentType, DocumentTypeDecision};

/// Stage 2 parse. An unreadable answer becomes `Other` with low confidence.
///
/// Accepts the JSON shape the prompt asks for, and falls back to a bare
/// label ("Lab report.") when the model ignores the format.
pub fn parse_type_decision(response: &str) -> DocumentTypeDecision {
    try_parse_type_decision(response).unwrap_or_else(|| {
        tracing::warn!(
            response_len = response.len(),
            "Classification response unusable, treating document as Other"
        );
        DocumentTypeDecision::undetermined("Classification response could not be read")
    })
}

/// Like [`parse_type_decision`] but reports an unreadable answer as `None`.
pub fn try_parse_type_decision(response: &str) -> Option<DocumentTypeDecision> {
    if let Ok(value) = extract_json_value(response) {
        if let Some(decision) = decision_from_json(&value) {
            return Some(decision);
        }
    }

    let label = response.trim().trim_end_matches('.').trim();
    if label.split_whitespace().count() > 3 {
        return None;
    }
    DocumentType::parse_lenient(label).map(|document_type| DocumentTypeDecision {
        document_type,
        confidence: Confidence::Low,
        reasoning: "Bare label answer".into(),
    })
}

fn decision_from_json(value: &Value) -> Option<DocumentTypeDecision> {
    let raw_type = value
        .get("type")
        .or_else(|| value.get("document_type"))
        .and_then(Value::as_str)?;
    let document_type = DocumentType::parse_lenient(raw_type)?;

    let confidence = value
        .get("confidence")
        .and_then(Value::as_str)
        .and_then(Confidence::parse_lenient)
        .unwrap_or(Confidence::Medium);
    let reasoning = value
        .get("reasoning")
        .or_else(|| value.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(DocumentTypeDecision {
        document_type,
        confidence,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_decision() {
        let d = parse_type_decision(
            r#"{"type": "lab_report", "confidence": "high", "reasoning": "Table of CBC values"}"#,
        );
        assert_eq!(d.document_type, DocumentType::LabReport);
        assert_eq!(d.confidence, Confidence::High);
        assert_eq!(d.reasoning, "Table of CBC values");
    }

    #[test]
    fn fenced_decision_with_alias_key() {
        let d = parse_type_decision(
            "```json\n{\"document_type\": \"Prescription\", \"confidence\": \"medium\"}\n```",
        );
        assert_eq!(d.document_type, DocumentType::Prescription);
        assert_eq!(d.confidence, Confidence::Medium);
    }

    #[test]
    fn bare_label() {
        let d = parse_type_decision("Prescription.");
        assert_eq!(d.document_type, DocumentType::Prescription);
        assert_eq!(d.confidence, Confidence::Low);
    }

    #[test]
    fn garbage_is_other_low() {
        let d = parse_type_decision("I am unable to determine what this image shows, sorry.");
        assert_eq!(d.document_type, DocumentType::Other);
        assert_eq!(d.confidence, Confidence::Low);
    }

    #[test]
    fn try_parse_reports_unreadable() {
        assert!(try_parse_type_decision("no idea").is_none());
        assert!(try_parse_type_decision(r#"{"type": "other"}"#).is_some());
    }

    #[test]
    fn unknown_type_is_other_low() {
        let d = parse_type_decision(r#"{"type": "x-ray", "confidence": "high"}"#);
        assert_eq!(d.document_type, DocumentType::Other);
        assert_eq!(d.confidence, Confidence::Low);
    }
}
