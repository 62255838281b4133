//! Any endpoint speaking the OpenAI `/chat/completions` wire format
//! (hosted Llama vision, vLLM, LM Studio, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ollama_types::validate_base_url;
use super::{ModelProvider, ModelRequest, ProviderError, CONNECT_TIMEOUT};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// `base_url` is the API root, e.g. `https://api.groq.com/openai/v1`.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        validate_base_url(base_url)?;
        if model.trim().is_empty() {
            return Err(ProviderError::Configuration("model name is empty".into()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: format!("openai:{model}"),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature: 0.0,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn completion_request<'a>(
        &'a self,
        request: &'a ModelRequest,
        image_uri: Option<String>,
    ) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(&request.system),
            });
        }
        let user_content = match image_uri {
            Some(url) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: &request.prompt,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                },
            ]),
            None => MessageContent::Text(&request.prompt),
        };
        messages.push(ChatMessage {
            role: "user",
            content: user_content,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            response_format: request.expect_json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let image_uri = request.image.as_ref().map(|img| img.data_uri());
        let body = self.completion_request(request, image_uri);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no completion content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("https://api.example.test/v1/", "vision-1", None).unwrap()
    }

    #[test]
    fn text_only_request_uses_plain_content() {
        let provider = provider();
        let request = ModelRequest::new("sys", "explain");
        let body = serde_json::to_value(provider.completion_request(&request, None)).unwrap();

        assert_eq!(body["model"], "vision-1");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "explain");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn image_request_uses_content_parts() {
        let provider = provider();
        let request = ModelRequest::new("", "read this").json();
        let body = serde_json::to_value(
            provider.completion_request(&request, Some("data:image/png;base64,AQID".into())),
        )
        .unwrap();

        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn base_url_trimmed() {
        assert_eq!(provider().base_url, "https://api.example.test/v1");
    }

    #[test]
    fn empty_model_rejected() {
        assert!(OpenAiCompatibleProvider::new("https://x.test", " ", None).is_err());
    }
}
