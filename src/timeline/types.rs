use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ClinicalExplanation, ExtractionResult};
use crate::pipeline::AnalysisOutcome;

/// One stored document of a patient, as the aggregator receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDocument {
    pub document_id: String,
    pub extraction: ExtractionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ClinicalExplanation>,
    /// When the collaborator stored the document. Last-resort date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
}

impl PatientDocument {
    pub fn new(document_id: impl Into<String>, extraction: ExtractionResult) -> Self {
        Self {
            document_id: document_id.into(),
            extraction,
            explanation: None,
            ingested_at: None,
        }
    }

    pub fn with_explanation(mut self, explanation: ClinicalExplanation) -> Self {
        self.explanation = Some(explanation);
        self
    }

    pub fn ingested_at(mut self, at: DateTime<Utc>) -> Self {
        self.ingested_at = Some(at);
        self
    }

    pub fn from_outcome(outcome: &AnalysisOutcome, ingested_at: DateTime<Utc>) -> Self {
        Self {
            document_id: outcome.document_id.to_string(),
            extraction: outcome.extraction.clone(),
            explanation: Some(outcome.explanation.clone()),
            ingested_at: Some(ingested_at),
        }
    }
}

/// Where a document's date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    /// A date field of the extraction payload.
    Structured,
    /// Found by scanning the raw document or model text.
    RawText,
    Ingestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub reference_range: Option<String>,
    pub source_document_id: String,
    pub date_source: DateSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    /// Canonical test name.
    pub test_name: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    /// Ascending by date. Always spans at least two distinct dates.
    pub points: Vec<TrendPoint>,
    pub clinical_meaning: String,
}

impl TrendSeries {
    pub fn latest(&self) -> Option<&TrendPoint> {
        self.points.last()
    }

    /// Latest value minus earliest value.
    pub fn change(&self) -> Option<f64> {
        Some(self.points.last()?.value - self.points.first()?.value)
    }
}

/// A document left out of the trend data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationGap {
    pub document_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub series: Vec<TrendSeries>,
    pub gaps: Vec<AggregationGap>,
}
