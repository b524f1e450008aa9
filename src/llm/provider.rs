use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::LlmError;
use crate::config::Config;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/responses";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1000;

/// Model calls get a generous fixed bound; everything else in the pipeline
/// relies on it being finite.
const MODEL_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Capability every backend provides: accept a prompt, return free-form text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// The closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// An unrecognized tag fails here, before any network call.
    pub fn parse(tag: &str) -> Result<Self, LlmError> {
        match tag {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(LlmError::UnsupportedProvider {
                provider: other.to_string(),
            }),
        }
    }
}

/// Resolve the configured provider into a concrete backend.
pub fn backend_for(config: &Config) -> Result<Box<dyn CompletionBackend>, LlmError> {
    match ProviderKind::parse(&config.llm.provider)? {
        ProviderKind::OpenAi => Ok(Box::new(OpenAiBackend::new(
            &config.llm.api_key,
            &config.llm.model,
        )?)),
        ProviderKind::Anthropic => Ok(Box::new(AnthropicBackend::new(
            &config.llm.api_key,
            &config.llm.model,
        )?)),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: Vec<ChatMessage<'a>>,
}

impl OpenAiBackend {
    pub fn new(api_key: &str, model: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(MODEL_CALL_TIMEOUT).build()?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = OpenAiRequest {
            model: &self.model,
            input: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let reply: Value = check_status(response).await?.json().await?;
        debug!(model = %self.model, "openai reply received");
        extract_text(&reply, "/output/1/content/0/text")
    }
}

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(api_key: &str, model: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(MODEL_CALL_TIMEOUT).build()?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = AnthropicRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: ANTHROPIC_MAX_TOKENS,
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let reply: Value = check_status(response).await?.json().await?;
        debug!(model = %self.model, "anthropic reply received");
        extract_text(&reply, "/content/0/text")
    }
}

/// Turn a 4xx into an error carrying the provider's own message when present;
/// let everything else surface as a plain transport error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(body);
        return Err(LlmError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.error_for_status()?)
}

/// Pull the answer text out of the provider-specific reply envelope.
fn extract_text(reply: &Value, pointer: &str) -> Result<String, LlmError> {
    reply
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::MalformedResponse {
            reason: format!("reply has no text at {}", pointer),
            raw: reply.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn config_with_provider(provider: &str) -> Config {
        let mut config = Config::default();
        config.llm.provider = provider.to_string();
        config.llm.model = "test-model".to_string();
        config.llm.api_key = "key".to_string();
        config
    }

    #[test]
    fn test_backend_for_known_providers() {
        assert_eq!(
            backend_for(&config_with_provider("openai")).unwrap().name(),
            "openai"
        );
        assert_eq!(
            backend_for(&config_with_provider("anthropic"))
                .unwrap()
                .name(),
            "anthropic"
        );
    }

    #[test]
    fn test_backend_for_rejects_unknown_provider() {
        let result = backend_for(&config_with_provider("mistral"));
        assert!(
            matches!(result, Err(LlmError::UnsupportedProvider { provider }) if provider == "mistral")
        );
    }

    #[test]
    fn test_openai_request_shape() {
        let request = OpenAiRequest {
            model: "gpt-test",
            input: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-test");
        assert_eq!(value["input"][0]["role"], "user");
        assert_eq!(value["input"][0]["content"], "hello");
    }

    #[test]
    fn test_anthropic_request_shape() {
        let request = AnthropicRequest {
            model: "claude-test",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            max_tokens: ANTHROPIC_MAX_TOKENS,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "claude-test");
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_extract_openai_reply_text() {
        let reply = json!({
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [{"type": "output_text", "text": "{\"answer\": 1}"}]}
            ]
        });
        let text = extract_text(&reply, "/output/1/content/0/text").unwrap();
        assert_eq!(text, "{\"answer\": 1}");
    }

    #[test]
    fn test_extract_anthropic_reply_text() {
        let reply = json!({
            "content": [{"type": "text", "text": "{\"answer\": 2}"}]
        });
        let text = extract_text(&reply, "/content/0/text").unwrap();
        assert_eq!(text, "{\"answer\": 2}");
    }

    #[test]
    fn test_extract_text_missing_field_keeps_raw() {
        let reply = json!({"unexpected": true});
        match extract_text(&reply, "/content/0/text") {
            Err(LlmError::MalformedResponse { raw, .. }) => {
                assert!(raw.contains("unexpected"));
            }
            other => panic!("expected MalformedResponse, got {:?}", other.map(|_| ())),
        }
    }
}
