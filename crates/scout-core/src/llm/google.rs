//! Google (Gemini) REST client, grounded on
//! `original_source/.../providers/gemini.py` and shaped like the teacher's
//! OpenAI-compatible provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::{GenerationParams, LlmProvider, LlmResponse, Message, Role, TokenUsage};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        GoogleProvider {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("static client configuration is always valid"),
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        // Gemini's `contents` API calls the assistant turn "model".
        Role::Assistant => "model",
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError> {
        let body = GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part { text: system_prompt }],
            },
            contents: messages
                .iter()
                .map(|m| Content {
                    role: role_str(m.role),
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            generation_config: GenerationConfig {
                max_output_tokens: params.max_tokens,
                temperature: params.temperature,
            },
        };

        let response = self.client.post(self.endpoint()).json(&body).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                retry_after_secs: 30,
            });
        }

        if !status.is_success() {
            let message = response
                .json::<GoogleErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(LlmResponse {
            text,
            usage: TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
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
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn complete_parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "hello from gemini"}]}}],
                "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4}
            })))
            .mount(&server)
            .await;

        let provider =
            GoogleProvider::new("test-key", "gemini-2.5-pro").with_base_url(server.uri());

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

        assert_eq!(response.text, "hello from gemini");
        assert_eq!(response.usage.input_tokens, 8);
    }

    #[tokio::test]
    async fn complete_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider =
            GoogleProvider::new("test-key", "gemini-2.5-pro").with_base_url(server.uri());

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
}
