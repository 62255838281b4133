use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intelligence::RiskReport;
use crate::models::{ClinicalExplanation, DocumentTypeDecision, ExtractionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Classify,
    Extract,
    Explain,
    Translate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Classify => "classify",
            Self::Extract => "extract",
            Self::Explain => "explain",
            Self::Translate => "translate",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// Completed with a lower-quality result (unparseable model answer,
    /// deterministic explanation, partially translated fields).
    Degraded,
    /// Primary provider exhausted; a fallback provider answered.
    FellBack,
}

/// What happened in one stage of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub attempts: u32,
}

impl StageReport {
    pub fn local(stage: Stage, status: StageStatus) -> Self {
        Self {
            stage,
            status,
            provider: None,
            attempts: 0,
        }
    }
}

/// Everything one `analyze` run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Fresh per run; re-analysing the same bytes yields a new id.
    pub document_id: Uuid,
    /// Base64 SHA-256 of the input bytes, for duplicate detection.
    pub content_hash: String,
    pub type_decision: DocumentTypeDecision,
    pub extraction: ExtractionResult,
    /// Present for lab reports only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskReport>,
    pub explanation: ClinicalExplanation,
    pub language: String,
    pub stages: Vec<StageReport>,
}

impl AnalysisOutcome {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}
