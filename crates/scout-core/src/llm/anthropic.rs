//! Anthropic Messages API client. Adapted from `tuitbot_core::llm::anthropic`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::{GenerationParams, LlmProvider, LlmResponse, Message, Role, TokenUsage};

const API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        AnthropicProvider {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("static client configuration is always valid"),
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Overrides the API base URL, used by tests to point at a mock server.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: UsageBlock,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(default)]
    message: String,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system: system_prompt,
            messages: messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: role_str(m.role),
                    content: &m.content,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::from_u16(529).unwrap()
        {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(LlmError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let message = response
                .json::<AnthropicErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: AnthropicResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            text,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.complete(
            "You are a health check.",
            &[Message {
                role: Role::User,
                content: "ping".to_string(),
            }],
            &GenerationParams {
                max_tokens: 1,
                temperature: 0.0,
            },
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn success_body() -> serde_json::Value {
        serde_json::json!({
            "content": [{"type": "text", "text": "hello from claude"}],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[tokio::test]
    async fn complete_parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", "claude-sonnet-4-5")
            .with_base_url(format!("{}/v1/messages", server.uri()));

        let response = provider
            .complete(
                "system",
                &[Message {
                    role: Role::User,
                    content: "hi".to_string(),
                }],
                &GenerationParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(response.text, "hello from claude");
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[tokio::test]
    async fn complete_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", "claude-sonnet-4-5")
            .with_base_url(format!("{}/v1/messages", server.uri()));

        let err = provider
            .complete(
                "system",
                &[Message {
                    role: Role::User,
                    content: "hi".to_string(),
                }],
                &GenerationParams::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn complete_maps_4xx_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "bad request"}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", "claude-sonnet-4-5")
            .with_base_url(format!("{}/v1/messages", server.uri()));

        let err = provider
            .complete(
                "system",
                &[Message {
                    role: Role::User,
                    content: "hi".to_string(),
                }],
                &GenerationParams::default(),
            )
            .await
            .unwrap_err();

        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad request");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
