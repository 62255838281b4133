use serde::{Deserialize, Serialize};

use super::de;
use super::enums::{Confidence, DocumentType};
use super::lab::LabTestObservation;

/// Outcome of the classification stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeDecision {
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub confidence: Confidence,
    pub reasoning: String,
}

impl DocumentTypeDecision {
    /// Fallback when the classifier's answer cannot be read.
    pub fn undetermined(reason: &str) -> Self {
        Self {
            document_type: DocumentType::Other,
            confidence: Confidence::Low,
            reasoning: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub age: Option<String>,
    #[serde(default, alias = "gender", deserialize_with = "de::opt_string")]
    pub sex: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub patient_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoctorInfo {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub qualification: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub registration_number: Option<String>,
    #[serde(default, alias = "hospital", deserialize_with = "de::opt_string")]
    pub clinic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrescribedMedication {
    #[serde(alias = "medicine_name", alias = "drug", deserialize_with = "de::string_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub dosage: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub quantity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionData {
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub doctor_info: DoctorInfo,
    #[serde(default, alias = "date", deserialize_with = "de::opt_string")]
    pub prescription_date: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub diagnosis: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_vec")]
    pub medications: Vec<PrescribedMedication>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub additional_instructions: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub follow_up_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabReportData {
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default, alias = "lab", deserialize_with = "de::opt_string")]
    pub lab_name: Option<String>,
    #[serde(default, alias = "date", deserialize_with = "de::opt_string")]
    pub report_date: Option<String>,
    #[serde(default, alias = "sample_date", deserialize_with = "de::opt_string")]
    pub collection_date: Option<String>,
    #[serde(default, alias = "tests", alias = "results", deserialize_with = "de::lenient_vec")]
    pub lab_tests: Vec<LabTestObservation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherDocumentData {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub title: Option<String>,
    #[serde(default, alias = "date", deserialize_with = "de::opt_string")]
    pub document_date: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub key_points: Vec<String>,
}

/// Type-specific extraction payload, keyed by the decided document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionPayload {
    Prescription(PrescriptionData),
    LabReport(LabReportData),
    Other(OtherDocumentData),
}

impl ExtractionPayload {
    pub fn empty(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::Prescription => Self::Prescription(PrescriptionData::default()),
            DocumentType::LabReport => Self::LabReport(LabReportData::default()),
            DocumentType::Other => Self::Other(OtherDocumentData::default()),
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            Self::Prescription(_) => DocumentType::Prescription,
            Self::LabReport(_) => DocumentType::LabReport,
            Self::Other(_) => DocumentType::Other,
        }
    }

    pub fn lab_tests(&self) -> &[LabTestObservation] {
        match self {
            Self::LabReport(data) => &data.lab_tests,
            _ => &[],
        }
    }

    pub fn medications(&self) -> &[PrescribedMedication] {
        match self {
            Self::Prescription(data) => &data.medications,
            _ => &[],
        }
    }

    /// Structured date-like fields, most specific first.
    pub fn structured_dates(&self) -> Vec<&str> {
        let candidates: Vec<Option<&String>> = match self {
            Self::LabReport(data) => vec![data.collection_date.as_ref(), data.report_date.as_ref()],
            Self::Prescription(data) => vec![data.prescription_date.as_ref()],
            Self::Other(data) => vec![data.document_date.as_ref()],
        };
        candidates.into_iter().flatten().map(String::as_str).collect()
    }
}

/// Structured data extracted from one document.
///
/// `parse_error = true` is a normal outcome: the model answered but its text
/// could not be read as the expected schema. The raw text is kept for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub payload: ExtractionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub confidence: Confidence,
    #[serde(default)]
    pub parse_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl ExtractionResult {
    pub fn new(payload: ExtractionPayload, confidence: Confidence) -> Self {
        Self {
            payload,
            raw_text: None,
            confidence,
            parse_error: false,
            raw_response: None,
        }
    }

    /// Degraded result for a model answer that could not be parsed.
    pub fn degraded(document_type: DocumentType, raw_response: &str) -> Self {
        Self {
            payload: ExtractionPayload::empty(document_type),
            raw_text: None,
            confidence: Confidence::Low,
            parse_error: true,
            raw_response: Some(raw_response.to_string()),
        }
    }

    pub fn document_type(&self) -> DocumentType {
        self.payload.document_type()
    }
}
