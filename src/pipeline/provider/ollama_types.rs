//! Ollama `/api/chat` wire types and endpoint validators.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ProviderError;

// ──────────────────────────────────────────────
// Request types
// ──────────────────────────────────────────────

/// Chat request for `/api/chat`.
///
/// Chat-template vision models expect the messages format; `/api/generate`
/// returns 500 for them when images are attached.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaChatMessage>,
    pub stream: bool,
    /// `"json"` constrains decoding to valid JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub options: OllamaOptions,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images (only for user messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl OllamaChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: &str, images: Option<Vec<String>>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            images,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaOptions {
    /// 0.0 for deterministic extraction.
    pub temperature: f32,
}

// ──────────────────────────────────────────────
// Response types
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct OllamaChatResponse {
    pub message: OllamaResponseMessage,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OllamaResponseMessage {
    #[serde(default)]
    pub content: String,
}

// ──────────────────────────────────────────────
// Validators
// ──────────────────────────────────────────────

static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("static regex")
});

/// Require an `http://` or `https://` URL with a non-empty host.
pub fn validate_base_url(url: &str) -> Result<(), ProviderError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| {
            ProviderError::Configuration(format!("base URL must be http(s): {url}"))
        })?;

    let authority = after_scheme.split('/').next().unwrap_or("");
    // IPv6 bracket notation: [::1]:11434
    let host = match authority.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(""),
        None => authority.split(':').next().unwrap_or(""),
    };
    if host.is_empty() {
        return Err(ProviderError::Configuration(format!(
            "base URL has no host: {url}"
        )));
    }
    Ok(())
}

/// Validate a model name against the Ollama naming convention:
/// `[namespace/]model[:tag]`, at most one namespace.
pub fn validate_model_name(name: &str) -> Result<(), ProviderError> {
    if MODEL_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ProviderError::Configuration(format!(
            "invalid model name: {name:?}"
        )))
    }
}
