//! Reading structured answers out of model text.
//!
//! Models wrap JSON in code fences, prefix it with prose, or append
//! commentary. [`extract_json_value`] digs the first JSON object out of all
//! of that; callers decide how to degrade when there is none.

use serde_json::Value;

use crate::models::{
    Confidence, DocumentType, ExtractionPayload, ExtractionResult, LabReportData,
    OtherDocumentData, PrescriptionData,
};

/// Why a model answer could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    NoJson,
    InvalidJson(String),
    WrongShape(String),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoJson => f.write_str("no JSON object in response"),
            Self::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            Self::WrongShape(e) => write!(f, "unexpected JSON shape: {e}"),
        }
    }
}

/// Strip markdown fences: "```json\n{...}\n```" to "{...}".
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json", "JSON", ...) up to the first newline.
    let body_start = after_fence
        .find('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// First balanced `{...}` object, respecting string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the JSON object embedded in a model response.
pub fn extract_json_value(response: &str) -> Result<Value, ParseFailure> {
    let unfenced = strip_code_fences(response);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }
    let candidate = first_json_object(unfenced)
        .or_else(|| first_json_object(response))
        .ok_or(ParseFailure::NoJson)?;
    serde_json::from_str(candidate).map_err(|e| ParseFailure::InvalidJson(e.to_string()))
}

/// Read a model-reported confidence ("high", "Medium", 0.82), defaulting to Medium.
pub fn confidence_from(value: &Value) -> Confidence {
    let raw = value
        .get("extraction_confidence")
        .or_else(|| value.get("confidence"));
    match raw {
        Some(Value::String(s)) => Confidence::parse_lenient(s).unwrap_or(Confidence::Medium),
        Some(Value::Number(n)) => match n.as_f64().unwrap_or(0.0) {
            x if x >= 0.8 => Confidence::High,
            x if x >= 0.5 => Confidence::Medium,
            _ => Confidence::Low,
        },
        _ => Confidence::Medium,
    }
}

/// Stage 3 parse. Never fails: unusable text becomes a degraded result.
pub fn parse_extraction(document_type: DocumentType, response: &str) -> ExtractionResult {
    match try_parse_extraction(document_type, response) {
        Ok(result) => result,
        Err(failure) => {
            tracing::warn!(
                document_type = %document_type,
                reason = %failure,
                response_len = response.len(),
                "Extraction response unusable, degrading"
            );
            ExtractionResult::degraded(document_type, response)
        }
    }
}

fn try_parse_extraction(
    document_type: DocumentType,
    response: &str,
) -> Result<ExtractionResult, ParseFailure> {
    let value = extract_json_value(response)?;
    let confidence = confidence_from(&value);
    let raw_text = value
        .get("raw_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let shape = |e: serde_json::Error| ParseFailure::WrongShape(e.to_string());
    let payload = match document_type {
        DocumentType::LabReport => ExtractionPayload::LabReport(
            serde_json::from_value::<LabReportData>(value).map_err(shape)?,
        ),
        DocumentType::Prescription => ExtractionPayload::Prescription(
            serde_json::from_value::<PrescriptionData>(value).map_err(shape)?,
        ),
        DocumentType::Other => ExtractionPayload::Other(
            serde_json::from_value::<OtherDocumentData>(value).map_err(shape)?,
        ),
    };

    let mut result = ExtractionResult::new(payload, confidence);
    result.raw_text = raw_text;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json() {
        let v = extract_json_value("Here you go:\n```json\n{\"a\": 1}\n```\nThanks").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn prose_wrapped_json() {
        let v = extract_json_value("Sure! {\"a\": {\"b\": \"}\"}} hope that helps").unwrap();
        assert_eq!(v["a"]["b"], "}");
    }

    #[test]
    fn bare_json() {
        assert_eq!(extract_json_value(" {\"x\": true} ").unwrap()["x"], true);
    }

    #[test]
    fn no_json_is_failure() {
        assert_eq!(
            extract_json_value("I could not read this image."),
            Err(ParseFailure::NoJson)
        );
    }

    #[test]
    fn truncated_json_is_failure() {
        assert_eq!(extract_json_value("{\"a\": [1, 2"), Err(ParseFailure::NoJson));
    }

    #[test]
    fn unfenced_without_newline() {
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn non_structured_text_degrades() {
        let result = parse_extraction(
            DocumentType::LabReport,
            "The image is blurry; values are hard to read.",
        );
        assert!(result.parse_error);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.document_type(), DocumentType::LabReport);
        assert_eq!(
            result.raw_response.as_deref(),
            Some("The image is blurry; values are hard to read.")
        );
    }

    #[test]
    fn lab_report_parsed() {
        let response = r#"```json
{
  "patient_info": {"name": "A", "age": 40, "sex": "F"},
  "report_date": "15/01/2025",
  "lab_tests": [
    {"test_name": "Hemoglobin", "value": 9.0, "unit": "g/dL", "reference_range": "12-16"},
    {"test_name": "Platelet Count", "value": "1,50,000", "unit": "/cumm", "reference_range": "1,50,000 - 4,50,000"}
  ],
  "extraction_confidence": "high"
}
```"#;
        let result = parse_extraction(DocumentType::LabReport, response);
        assert!(!result.parse_error);
        assert_eq!(result.confidence, Confidence::High);
        let tests = result.payload.lab_tests();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].raw_value.numeric(), Some(9.0));
        assert_eq!(tests[1].raw_value.numeric(), Some(150_000.0));
    }

    #[test]
    fn prescription_parsed() {
        let response = r#"{"medications": [{"medicine_name": "Amoxicillin", "dosage": "500 mg"}], "confidence": 0.4}"#;
        let result = parse_extraction(DocumentType::Prescription, response);
        assert_eq!(result.payload.medications()[0].name, "Amoxicillin");
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn wrong_shape_degrades() {
        let result = parse_extraction(DocumentType::LabReport, r#"{"lab_tests": 42, "patient_info": "x"}"#);
        assert!(result.parse_error);
    }
}
