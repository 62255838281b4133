pub mod classify;
pub mod diagnostic; // Per-run dump (CLINSIGHT_DUMP_DIR)
pub mod explain;
pub mod grounding;
pub mod media;
pub mod orchestrator;
pub mod parser;
pub mod pdfium;
pub mod prompt;
pub mod provider;
pub mod render;
pub mod resilience;
pub mod sanitize;
pub mod types;

pub use media::MediaType;
pub use orchestrator::AnalysisPipeline;
pub use provider::{ModelProvider, ModelRequest, ProviderError};
pub use render::{PageRenderer, RenderError};
pub use resilience::{call_with_resilience, RetryPolicy};
pub use types::{AnalysisOutcome, Stage, StageReport, StageStatus};

use thiserror::Error;

use crate::models::ValidationError;
use crate::pipeline_config::ConfigError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("{stage} stage failed after {attempts} attempt(s) (fatal: {fatal}): {source}")]
    Stage {
        stage: Stage,
        attempts: u32,
        fatal: bool,
        #[source]
        source: ProviderError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider setup error: {0}")]
    Provider(#[from] ProviderError),
}

impl PipelineError {
    /// Stage the error came from, when it came from a model stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            Self::Validation(_) | Self::Render(_) => Some(Stage::Normalize),
            Self::Config(_) | Self::Provider(_) => None,
        }
    }

    /// Whether the run was aborted. Downgraded stages never surface as an
    /// error; they show up as `StageStatus::Degraded` in the outcome.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Stage { fatal, .. } => *fatal,
            _ => true,
        }
    }
}
