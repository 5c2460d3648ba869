//! LLM provider abstraction: a bound chat-style model, generalized from
//! `tuitbot_core::llm::LlmProvider`. A provider is a single request/response
//! turn; it never sees tool definitions or a tool-call loop — the Executor
//! decides which adapters to call, and [`crate::workflow::AgentRuntime`]
//! only enforces the structured-output contract on top of plain text.

pub mod anthropic;
pub mod factory;
pub mod google;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Token accounting returned alongside a completion, for cost tracking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The raw text result of one model call, before any structured-output parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Sampling parameters for a single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// One turn of conversation sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A bound chat-style model. Implementations never see tool definitions or
/// the structured-output contract — the Executor gathers candidates itself
/// and [`crate::workflow::AgentRuntime`] parses the reply against the
/// declared schema one layer up — a provider only knows how to turn a
/// system prompt + message history into text (spec §4.D).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// A short identifier used in logs and telemetry attributes ("anthropic", "google").
    fn name(&self) -> &'static str;

    /// Sends `system_prompt` + `messages` to the provider and returns raw text.
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError>;

    /// A cheap call used to verify credentials/connectivity at startup.
    async fn health_check(&self) -> Result<(), LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_params_defaults_match_spec_guidance() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 1024);
        assert!((params.temperature - 0.7).abs() < f32::EPSILON);
    }
}
