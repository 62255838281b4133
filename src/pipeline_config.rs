//! Explicit pipeline configuration.
//!
//! Every calibration constant (risk weights, severity multiplier, tier
//! thresholds), every retry knob, and every provider endpoint lives here and
//! is handed to the pipeline at construction time. Nothing is read ambiently
//! except API keys, which are resolved from the environment variable the
//! config names so that secrets never sit in the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::models::RiskLevel;
use crate::pipeline::resilience::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),
}

// ═══════════════════════════════════════════════════════════
// Risk calibration
// ═══════════════════════════════════════════════════════════

/// Score thresholds separating the four risk tiers.
///
/// `score < moderate_at` is Low, `score > critical_above` is Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskTiers {
    pub moderate_at: u32,
    pub high_at: u32,
    pub critical_above: u32,
}

impl Default for RiskTiers {
    fn default() -> Self {
        Self {
            moderate_at: 20,
            high_at: 50,
            critical_above: 80,
        }
    }
}

impl RiskTiers {
    pub fn level_for(&self, score: u32) -> RiskLevel {
        if score > self.critical_above {
            RiskLevel::Critical
        } else if score >= self.high_at {
            RiskLevel::High
        } else if score >= self.moderate_at {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Score contribution of each Critical finding.
    pub critical_weight: u32,
    /// Score contribution of each Abnormal finding.
    pub abnormal_weight: u32,
    /// A value is Critical when it overshoots its bound by more than this
    /// multiple of the bound-to-midpoint distance.
    pub critical_multiplier: f64,
    pub tiers: RiskTiers,
    /// Non-normal member tests needed before a clinical pattern flag is raised.
    pub pattern_min_indicators: usize,
    /// Use the built-in standard ranges when a report omits a range.
    pub standard_range_fallback: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            critical_weight: 15,
            abnormal_weight: 5,
            critical_multiplier: 1.5,
            tiers: RiskTiers::default(),
            pattern_min_indicators: 2,
            standard_range_fallback: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Resilience, rendering, providers
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `n * backoff_unit_ms`.
    pub backoff_unit_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_ms: 2_000,
            attempt_timeout_secs: 120,
        }
    }
}

impl ResilienceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.max_attempts,
            Duration::from_millis(self.backoff_unit_ms),
            Duration::from_secs(self.attempt_timeout_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub dpi: u32,
    pub max_dimension_px: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_dimension_px: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local Ollama `/api/chat`.
    Ollama,
    /// Any `/chat/completions` endpoint speaking the OpenAI wire format.
    #[serde(alias = "openai")]
    OpenAiCompatible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Name of the env var holding the API key. Never the key itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn ollama(model: &str) -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: "http://localhost:11434".into(),
            model: model.into(),
            api_key_env: None,
            temperature: 0.0,
        }
    }

    pub fn openai_compatible(base_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            kind: ProviderKind::OpenAiCompatible,
            base_url: base_url.into(),
            model: model.into(),
            api_key_env: Some(api_key_env.into()),
            temperature: 0.0,
        }
    }

    /// Resolve the API key from the configured env var.
    pub fn api_key(&self) -> Result<Option<String>, ConfigError> {
        match &self.api_key_env {
            None => Ok(None),
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| ConfigError::MissingEnv(var.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Vision-capable provider used for classification, extraction and explanation.
    pub primary: ProviderConfig,
    /// Text-only provider used when the primary exhausts its explanation budget.
    pub fallback: Option<ProviderConfig>,
    pub translation: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: ProviderConfig::ollama("llama3.2-vision"),
            fallback: Some(ProviderConfig::openai_compatible(
                "https://api.groq.com/openai/v1",
                "llama-3.3-70b-versatile",
                "GROQ_API_KEY",
            )),
            translation: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub risk: RiskConfig,
    pub resilience: ResilienceConfig,
    pub render: RenderConfig,
    pub providers: ProvidersConfig,
    /// Language the pipeline produces natively; other targets go through translation.
    pub default_language: String,
    /// Field translations sent to the translation provider at once.
    pub translation_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            resilience: ResilienceConfig::default(),
            render: RenderConfig::default(),
            providers: ProvidersConfig::default(),
            default_language: "en".into(),
            translation_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON config. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Load from `CLINSIGHT_CONFIG` or the per-user config file, else defaults.
    ///
    /// A file that exists but fails to parse is an error, not a silent default.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match config::config_file_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "Loading pipeline config");
                Self::load(&path)
            }
            _ => {
                tracing::debug!("No pipeline config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resilience.max_attempts == 0 {
            return Err(ConfigError::Invalid("resilience.max_attempts must be >= 1".into()));
        }
        if self.resilience.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "resilience.attempt_timeout_secs must be >= 1".into(),
            ));
        }
        let tiers = &self.risk.tiers;
        if !(tiers.moderate_at <= tiers.high_at && tiers.high_at <= tiers.critical_above) {
            return Err(ConfigError::Invalid(
                "risk.tiers must satisfy moderate_at <= high_at <= critical_above".into(),
            ));
        }
        if !self.risk.critical_multiplier.is_finite() || self.risk.critical_multiplier < 0.0 {
            return Err(ConfigError::Invalid(
                "risk.critical_multiplier must be a non-negative number".into(),
            ));
        }
        if self.translation_concurrency == 0 {
            return Err(ConfigError::Invalid("translation_concurrency must be >= 1".into()));
        }
        if self.providers.primary.model.trim().is_empty() {
            return Err(ConfigError::Invalid("providers.primary.model is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_calibration() {
        let config = PipelineConfig::default();
        assert_eq!(config.risk.critical_weight, 15);
        assert_eq!(config.risk.abnormal_weight, 5);
        assert_eq!(config.risk.critical_multiplier, 1.5);
        assert_eq!(config.resilience.max_attempts, 3);
        assert_eq!(config.resilience.backoff_unit_ms, 2_000);
        assert_eq!(config.default_language, "en");
        assert_eq!(config.translation_concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tier_boundaries() {
        let tiers = RiskTiers::default();
        assert_eq!(tiers.level_for(0), RiskLevel::Low);
        assert_eq!(tiers.level_for(19), RiskLevel::Low);
        assert_eq!(tiers.level_for(20), RiskLevel::Moderate);
        assert_eq!(tiers.level_for(49), RiskLevel::Moderate);
        assert_eq!(tiers.level_for(50), RiskLevel::High);
        assert_eq!(tiers.level_for(80), RiskLevel::High);
        assert_eq!(tiers.level_for(81), RiskLevel::Critical);
        assert_eq!(tiers.level_for(100), RiskLevel::Critical);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            PipelineConfig::from_json_str(r#"{"risk": {"critical_weight": 20}}"#).unwrap();
        assert_eq!(config.risk.critical_weight, 20);
        assert_eq!(config.risk.abnormal_weight, 5);
        assert_eq!(config.resilience, ResilienceConfig::default());
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = PipelineConfig::from_json_str(r#"{"resilience": {"max_attempts": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_monotonic_tiers() {
        let err = PipelineConfig::from_json_str(
            r#"{"risk": {"tiers": {"moderate_at": 60, "high_at": 50, "critical_above": 80}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"providers": {"primary": {"kind": "open_ai_compatible", "base_url": "https://api.example.test/v1", "model": "vision-1", "api_key_env": "EXAMPLE_KEY"}}}"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.providers.primary.kind, ProviderKind::OpenAiCompatible);
        assert_eq!(config.providers.primary.model, "vision-1");
        assert_eq!(
            config.providers.primary.api_key_env.as_deref(),
            Some("EXAMPLE_KEY")
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = ResilienceConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(120));
        assert_eq!(policy.backoff_after(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(4));
    }

    #[test]
    fn api_key_without_env_is_none() {
        assert!(ProviderConfig::ollama("m").api_key().unwrap().is_none());
    }

    #[test]
    fn api_key_missing_env_errors() {
        let config = ProviderConfig::openai_compatible(
            "https://example.test/v1",
            "m",
            "CLINSIGHT_TEST_SURELY_UNSET_KEY",
        );
        assert!(matches!(config.api_key(), Err(ConfigError::MissingEnv(_))));
    }
}
