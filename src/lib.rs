pub mod config;
pub mod pipeline_config;
pub mod models;
pub mod intelligence; // Deterministic risk classification
pub mod pipeline; // Multi-stage document analysis
pub mod translation; // Field-scoped translation cascade
pub mod timeline; // Longitudinal lab trends

pub use intelligence::{classify, RiskEngine};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline, PipelineError};
pub use pipeline_config::PipelineConfig;
pub use timeline::{aggregate, aggregate_with_gaps};
pub use translation::translate;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`; falls back to [`config::default_log_filter`].
/// Safe to call more than once: later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} core v{}", config::APP_NAME, config::APP_VERSION);
}
