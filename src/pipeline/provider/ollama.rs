use async_trait::async_trait;

use super::ollama_types::{
    validate_base_url, validate_model_name, OllamaChatMessage, OllamaChatRequest,
    OllamaChatResponse, OllamaOptions,
};
use super::{ModelProvider, ModelRequest, ProviderError, CONNECT_TIMEOUT};

/// Local Ollama instance serving a vision-capable chat model.
pub struct OllamaProvider {
    name: String,
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Result<Self, ProviderError> {
        validate_base_url(base_url)?;
        validate_model_name(model)?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: format!("ollama:{model}"),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: 0.0,
            client,
        })
    }

    /// Default Ollama instance at localhost:11434.
    pub fn default_local(model: &str) -> Result<Self, ProviderError> {
        Self::new("http://localhost:11434", model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn chat_request(&self, request: &ModelRequest) -> OllamaChatRequest {
        let images = request.image.as_ref().map(|img| vec![img.to_base64()]);
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(OllamaChatMessage::system(&request.system));
        }
        messages.push(OllamaChatMessage::user(&request.prompt, images));

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: request.expect_json.then(|| "json".to_string()),
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.temperature),
            },
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.chat_request(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if !parsed.done {
            tracing::debug!(model = %self.model, "Ollama reported an unfinished response");
        }
        if parsed.message.content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse("empty message content".into()));
        }
        Ok(parsed.message.content)
    }
}
