//! The Agent Runtime: owns the bound [`LlmProvider`] and enforces the
//! structured-output contract (spec §4.D) that providers themselves never
//! see. Every call here is a single request/response turn — there is no
//! provider-side tool-calling loop; the Executor gathers candidates itself
//! and hands the runtime already-fetched items to select from and write
//! about.

use crate::error::{AdapterError, LlmError, WorkflowError};
use crate::llm::{GenerationParams, LlmProvider, Message, Role};
use crate::source::Item;
use crate::workflow::ScoutItem;

const STRUCTURED_OUTPUT_SYSTEM_PROMPT: &str = "You respond with a JSON array only, no prose \
and no markdown code fences. Each element is an object with keys: title (string), \
url (string or null), summary (string), sources (array of strings), image_path (string or null).";

pub struct AgentRuntime {
    llm: Box<dyn LlmProvider>,
}

impl AgentRuntime {
    pub fn new(llm: Box<dyn LlmProvider>) -> Self {
        AgentRuntime { llm }
    }

    /// Asks the model to turn `raw_items` into structured [`ScoutItem`]s
    /// that serve `goal`, given the tool catalogue text for context. Fails
    /// with [`AdapterError::StructuredOutputFailure`] if the reply does not
    /// parse as the declared schema — the Executor does not retry this.
    pub async fn propose_items(
        &self,
        goal: &str,
        catalogue: &str,
        raw_items: &[Item],
        limit: usize,
    ) -> Result<Vec<ScoutItem>, AdapterError> {
        let mut listing = String::new();
        for (i, item) in raw_items.iter().enumerate() {
            listing.push_str(&format!(
                "{}. {} — {}\n   url: {}\n",
                i + 1,
                item.title,
                item.summary,
                item.url.as_deref().unwrap_or("(none)")
            ));
        }

        let user_message = format!(
            "{catalogue}\n\n{goal}\n\nCandidates:\n{listing}\n\nReturn the best up to {limit} \
             as the declared JSON array."
        );

        let response = self
            .llm
            .complete(
                STRUCTURED_OUTPUT_SYSTEM_PROMPT,
                &[Message {
                    role: Role::User,
                    content: user_message,
                }],
                &GenerationParams::default(),
            )
            .await
            .map_err(AdapterError::from)?;

        parse_structured_output(&response.text)
    }

    /// Picks the index of the best item among `items` for this scout's
    /// goal. Falls back to index 0 on any provider failure — a generation
    /// scout would rather draft *something* than fail the whole run over a
    /// ranking call.
    pub async fn select_best(&self, items: &[ScoutItem]) -> Result<usize, LlmError> {
        if items.len() <= 1 {
            return Ok(0);
        }

        let listing: String = items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}: {}\n", i, item.title, item.summary))
            .collect();

        let response = self
            .llm
            .complete(
                "Respond with only the number of the single best candidate, nothing else.",
                &[Message {
                    role: Role::User,
                    content: format!("Candidates:\n{listing}"),
                }],
                &GenerationParams {
                    max_tokens: 8,
                    temperature: 0.0,
                },
            )
            .await?;

        Ok(response
            .text
            .trim()
            .parse::<usize>()
            .unwrap_or(0)
            .min(items.len() - 1))
    }

    /// Writes the platform-specific post body for `item`, using the
    /// scout's own prompt template as the system prompt.
    pub async fn write_post(
        &self,
        prompt_template: &str,
        item: &ScoutItem,
        platform: &str,
    ) -> Result<String, WorkflowError> {
        let user_message = format!(
            "Platform: {platform}\nTitle: {}\nSummary: {}\nURL: {}\n\nWrite the post.",
            item.title,
            item.summary,
            item.url.as_deref().unwrap_or("(none)")
        );

        let response = self
            .llm
            .complete(
                prompt_template,
                &[Message {
                    role: Role::User,
                    content: user_message,
                }],
                &GenerationParams::default(),
            )
            .await?;

        Ok(response.text)
    }
}

/// Parses the model's reply as a JSON array of [`ScoutItem`], tolerating a
/// markdown code fence around it (models reach for ```json even when told
/// not to).
fn parse_structured_output(text: &str) -> Result<Vec<ScoutItem>, AdapterError> {
    let trimmed = strip_code_fence(text.trim());
    serde_json::from_str::<Vec<ScoutItem>>(trimmed).map_err(|e| {
        AdapterError::StructuredOutputFailure {
            message: format!("expected a JSON array of items: {e}"),
        }
    })
}

fn strip_code_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeLlm {
        reply: String,
        /// Records every user message sent, for assertion.
        seen: Mutex<Vec<String>>,
    }

    impl FakeLlm {
        fn new(reply: impl Into<String>) -> Self {
            FakeLlm {
                reply: reply.into(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn complete(
            &self,
            _system_prompt: &str,
            messages: &[Message],
            _params: &GenerationParams,
        ) -> Result<crate::llm::LlmResponse, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push(messages.first().map(|m| m.content.clone()).unwrap_or_default());
            Ok(crate::llm::LlmResponse {
                text: self.reply.clone(),
                usage: Default::default(),
            })
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    fn sample_item() -> Item {
        Item {
            source_id: "1".to_string(),
            title: "Title".to_string(),
            url: Some("https://example.com".to_string()),
            summary: "Summary".to_string(),
            published_at: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn propose_items_parses_plain_json_array() {
        let reply = r#"[{"title": "T", "url": "https://x", "summary": "S", "sources": ["https://x"]}]"#;
        let runtime = AgentRuntime::new(Box::new(FakeLlm::new(reply)));

        let items = runtime
            .propose_items("goal", "catalogue", &[sample_item()], 1)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "T");
    }

    #[tokio::test]
    async fn propose_items_strips_markdown_code_fence() {
        let reply = "```json\n[{\"title\": \"T\", \"summary\": \"S\"}]\n```";
        let runtime = AgentRuntime::new(Box::new(FakeLlm::new(reply)));

        let items = runtime
            .propose_items("goal", "catalogue", &[sample_item()], 1)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn propose_items_rejects_non_array_reply() {
        let runtime = AgentRuntime::new(Box::new(FakeLlm::new("not json at all")));

        let err = runtime
            .propose_items("goal", "catalogue", &[sample_item()], 1)
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::StructuredOutputFailure { .. }));
    }

    #[tokio::test]
    async fn select_best_defaults_to_zero_on_single_item() {
        let runtime = AgentRuntime::new(Box::new(FakeLlm::new("irrelevant")));
        let items = vec![ScoutItem {
            title: "Only".to_string(),
            url: None,
            summary: "S".to_string(),
            sources: vec![],
            image_path: None,
        }];
        assert_eq!(runtime.select_best(&items).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn write_post_returns_provider_text() {
        let runtime = AgentRuntime::new(Box::new(FakeLlm::new("Here is the post.")));
        let item = ScoutItem {
            title: "T".to_string(),
            url: None,
            summary: "S".to_string(),
            sources: vec![],
            image_path: None,
        };
        let body = runtime.write_post("prompt", &item, "twitter").await.unwrap();
        assert_eq!(body, "Here is the post.");
    }
}
