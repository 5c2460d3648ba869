//! Search adapter: a stateless transform over a web-search tool call. The
//! retry policy cycles through a fixed set of query suffixes (spec §4.E.6)
//! rather than perturbing anything adapter-internal.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AdapterError;
use crate::source::{build_http_client, classify_status, Item, SourceAdapter};

/// The fixed suffix rotation the Executor appends to the query on retry
/// (spec §4.E.6), indexed by `attempt`.
pub const RETRY_SUFFIXES: [&str; 4] = [
    "recent developments",
    "latest updates",
    "new findings",
    "alternative perspectives on",
];

/// Returns the retry-perturbed query for the given attempt number.
pub fn perturbed_query(base_query: &str, attempt: u32) -> String {
    let suffix = RETRY_SUFFIXES[attempt as usize % RETRY_SUFFIXES.len()];
    format!("{base_query} {suffix}")
}

/// `search` scout config: `{"query": string}` (spec §6).
#[derive(Debug, Deserialize)]
struct SearchConfig {
    query: String,
}

#[derive(Debug, Deserialize)]
struct SearchApiResult {
    results: Vec<SearchApiItem>,
}

#[derive(Debug, Deserialize)]
struct SearchApiItem {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

/// Generic search adapter speaking a Brave/Bing/SearX-style JSON contract.
/// The concrete endpoint is injected via `endpoint` so tests and deployments
/// never need to vary this type.
pub struct SearchAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl SearchAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        SearchAdapter {
            client: build_http_client(std::time::Duration::from_secs(20)),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for SearchAdapter {
    fn name(&self) -> &'static str {
        "google_search"
    }

    async fn fetch(&self, cfg: &serde_json::Value, limit: usize) -> Result<Vec<Item>, AdapterError> {
        let config: SearchConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            AdapterError::ConfigurationMissing {
                field: format!("search config: {e}"),
            }
        })?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", config.query.as_str()), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("search request failed: {e}"),
            })?;

        if let Some(err) = classify_status(response.status(), "search") {
            return Err(err);
        }

        let parsed: SearchApiResult = response
            .json()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("parsing search response: {e}"),
            })?;

        Ok(parsed
            .results
            .into_iter()
            .take(limit)
            .map(|r| Item {
                source_id: r.url.clone(),
                title: r.title,
                url: Some(r.url),
                summary: r.snippet,
                published_at: None,
                metadata: std::collections::HashMap::new(),
            })
            .collect())
    }
}
