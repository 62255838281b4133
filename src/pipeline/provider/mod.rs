pub mod mock;
pub mod ollama;
pub mod ollama_types;
pub mod openai;

pub use mock::{Scripted, ScriptedProvider};
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

use super::media::MediaType;
use crate::pipeline_config::{ProviderConfig, ProviderKind};

/// Connect timeout for provider HTTP clients. The per-attempt deadline is
/// enforced by the resilience layer.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model call aborted: {0}")]
    Aborted(String),

    #[error("Cannot reach {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Provider rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("Provider quota or rate limit exceeded")]
    QuotaExceeded,

    #[error("Provider rejected the request as malformed: {0}")]
    MalformedRequest(String),

    #[error("Provider returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider misconfigured: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Timeouts, aborts and network failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Aborted(_) | Self::Network { .. }
        )
    }

    /// The provider answered, but with nothing usable.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::InvalidResponse(_))
    }

    /// Map a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            429 => Self::QuotaExceeded,
            400 | 422 => Self::MalformedRequest(body),
            _ => Self::Status { status, body },
        }
    }

    pub fn from_reqwest(endpoint: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(CONNECT_TIMEOUT)
        } else if e.is_connect() || e.is_request() {
            Self::Network {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        } else if e.is_decode() || e.is_body() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Aborted(e.to_string())
        }
    }
}

/// Raster image handed to a vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub bytes: Arc<[u8]>,
    pub media_type: MediaType,
}

impl ImageAttachment {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: MediaType) -> Self {
        Self {
            bytes: bytes.into(),
            media_type,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:` URI for endpoints that take inline images.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type.mime(), self.to_base64())
    }
}

/// One model call: system instructions, user prompt, optional image.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
    /// Overrides the provider's configured temperature.
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON-only answer when it supports that.
    pub expect_json: bool,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            image: None,
            temperature: None,
            expect_json: false,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.expect_json = true;
        self
    }
}

/// A generative model reachable over some transport.
///
/// The pipeline only ever talks to this trait; transport details stay in
/// the implementations.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable label used in logs and stage reports.
    fn name(&self) -> &str;

    fn supports_images(&self) -> bool {
        true
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ProviderError>;
}

/// Build a provider from its config entry.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let provider: Arc<dyn ModelProvider> = match config.kind {
        ProviderKind::Ollama => Arc::new(
            OllamaProvider::new(&config.base_url, &config.model)?
                .with_temperature(config.temperature),
        ),
        ProviderKind::OpenAiCompatible => {
            let api_key = config
                .api_key()
                .map_err(|e| ProviderError::Configuration(e.to_string()))?;
            Arc::new(
                OpenAiCompatibleProvider::new(&config.base_url, &config.model, api_key)?
                    .with_temperature(config.temperature),
            )
        }
    };
    tracing::debug!(
        provider = provider.name(),
        kind = ?config.kind,
        "Model provider configured"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProviderError::Aborted("reset".into()).is_transient());
        assert!(ProviderError::Network {
            endpoint: "http://x".into(),
            reason: "refused".into()
        }
        .is_transient());
        assert!(!ProviderError::QuotaExceeded.is_transient());
        assert!(!ProviderError::Unauthorized { status: 401 }.is_transient());
        assert!(!ProviderError::MalformedRequest("bad".into()).is_transient());
        assert!(!ProviderError::InvalidResponse("empty".into()).is_transient());
        assert!(ProviderError::InvalidResponse("empty".into()).is_unreadable());
        assert!(!ProviderError::QuotaExceeded.is_unreadable());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ProviderError::from_status(401, String::new()),
            ProviderError::Unauthorized { status: 401 }
        );
        assert_eq!(
            ProviderError::from_status(403, String::new()),
            ProviderError::Unauthorized { status: 403 }
        );
        assert_eq!(
            ProviderError::from_status(429, String::new()),
            ProviderError::QuotaExceeded
        );
        assert!(matches!(
            ProviderError::from_status(422, "bad schema".into()),
            ProviderError::MalformedRequest(body) if body == "bad schema"
        ));
        assert!(matches!(
            ProviderError::from_status(500, "oops".into()),
            ProviderError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn data_uri_carries_mime() {
        let image = ImageAttachment::new(vec![1u8, 2, 3], MediaType::Png);
        assert_eq!(image.data_uri(), "data:image/png;base64,AQID");
    }

    #[test]
    fn request_builder() {
        let request = ModelRequest::new("sys", "user")
            .with_temperature(0.2)
            .json();
        assert!(request.expect_json);
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.image.is_none());
    }

    #[test]
    fn build_ollama_from_config() {
        let provider = build_provider(&ProviderConfig::ollama("llama3.2-vision")).unwrap();
        assert_eq!(provider.name(), "ollama:llama3.2-vision");
    }

    #[test]
    fn build_openai_without_key_is_configuration_error() {
        let config = ProviderConfig::openai_compatible(
            "https://api.example.test/v1",
            "m",
            "CLINSIGHT_TEST_SURELY_UNSET_PROVIDER_KEY",
        );
        assert!(matches!(
            build_provider(&config),
            Err(ProviderError::Configuration(_))
        ));
    }
}
