//! Source adapter framework: a uniform `fetch(cfg, limit) -> [Item]` over
//! RSS, Reddit, Search, ArXiv, and raw HTTP, generalized from
//! `ContentSourceProvider` in the teacher crate.

pub mod arxiv;
pub mod http;
pub mod reddit;
pub mod rss;
pub mod search;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// An in-memory candidate produced by a source adapter, before dedup.
/// Never persisted directly — see `GLOSSARY` in the design notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    pub summary: String,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: HashMap<String, String>,
}

impl Item {
    /// The text the Dedup Store fingerprints: `title + " " + summary`
    /// (spec §4.E.5).
    pub fn dedup_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// One source-specific way of producing [`Item`]s. Adapters never touch the
/// Dedup Store; the Executor applies dedup uniformly across every adapter's
/// output (spec §4.B).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// A short identifier used in logs and tool-catalogue text ("rss", "reddit", ...).
    fn name(&self) -> &'static str;

    /// Fetches up to `limit` items using the adapter-specific `cfg` blob.
    async fn fetch(&self, cfg: &serde_json::Value, limit: usize) -> Result<Vec<Item>, AdapterError>;
}

/// Builds a `reqwest::Client` with a realistic user agent and a bounded
/// timeout, shared by every adapter (spec §4.B: "all adapters attach a
/// realistic User-Agent and enforce a bounded request timeout").
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("ScoutEngine/1.0 (+https://example.invalid/scout-engine)")
        .timeout(timeout)
        .build()
        .expect("static client configuration is always valid")
}

/// Classifies a `reqwest` response status into one of the five engine error
/// kinds, per spec §7. Adapters call this at their HTTP boundary so nothing
/// downstream ever sees a raw status code.
pub fn classify_status(status: reqwest::StatusCode, context: &str) -> Option<AdapterError> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        404 => AdapterError::NotFound {
            message: format!("{context}: not found"),
        },
        429 => AdapterError::RateLimited { retry_after_secs: None },
        500..=599 => AdapterError::TransientNetwork {
            message: format!("{context}: server error {status}"),
        },
        other => AdapterError::TransientNetwork {
            message: format!("{context}: unexpected status {other}"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_text_joins_title_and_summary() {
        let item = Item {
            source_id: "1".to_string(),
            title: "T".to_string(),
            url: None,
            summary: "S".to_string(),
            published_at: None,
            metadata: HashMap::new(),
        };
        assert_eq!(item.dedup_text(), "T S");
    }

    #[test]
    fn classify_status_maps_404_and_429() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::NOT_FOUND, "reddit"),
            Some(AdapterError::NotFound { .. })
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "reddit"),
            Some(AdapterError::RateLimited { .. })
        ));
        assert!(classify_status(reqwest::StatusCode::OK, "reddit").is_none());
    }
}
