//! ArXiv adapter: a stateless transform over the public ArXiv Atom export
//! API. Accepts an optional `days_back` window, doubled on retry (spec §4.B,
//! §4.E.6) and capped at 90 days.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::AdapterError;
use crate::source::{build_http_client, classify_status, Item, SourceAdapter};

/// The longest retry window the perturbation policy will ever request.
pub const MAX_DAYS_BACK: u32 = 90;

/// `arxiv` scout config: `{"query": string, "date_filter": "today"|"week"|"month"}` (spec §6).
#[derive(Debug, Deserialize)]
struct ArxivConfig {
    query: String,
    #[serde(default)]
    date_filter: Option<String>,
    #[serde(default)]
    days_back: Option<u32>,
}

/// Converts a `date_filter` keyword to a day count (1/7/30 per spec §6).
pub fn date_filter_to_days(filter: &str) -> u32 {
    match filter {
        "today" => 1,
        "week" => 7,
        "month" => 30,
        _ => 7,
    }
}

/// Doubles `days_back`, capped at [`MAX_DAYS_BACK`] (spec §4.E.6).
pub fn double_days_back(days_back: u32) -> u32 {
    (days_back * 2).min(MAX_DAYS_BACK)
}

/// Renders `days_back` as the `submittedDate:[from TO to]` clause ArXiv's
/// query language expects, so a doubled retry window actually broadens the
/// HTTP request instead of only the goal text shown to the model.
fn submitted_date_clause(days_back: u32) -> String {
    let to = Utc::now();
    let from = to - chrono::Duration::days(days_back as i64);
    format!(
        "AND submittedDate:[{} TO {}]",
        from.format("%Y%m%d%H%M"),
        to.format("%Y%m%d%H%M")
    )
}

/// Builds the unencoded `search_query` value: `all:<query>` plus a
/// `submittedDate` range clause when a retry window is known.
fn build_search_query(query: &str, days_back: Option<u32>) -> String {
    match days_back {
        Some(days) => format!("all:{} {}", query, submitted_date_clause(days)),
        None => format!("all:{query}"),
    }
}

pub struct ArxivAdapter {
    client: reqwest::Client,
}

impl ArxivAdapter {
    pub fn new() -> Self {
        ArxivAdapter {
            client: build_http_client(std::time::Duration::from_secs(30)),
        }
    }
}

impl Default for ArxivAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn fetch(&self, cfg: &serde_json::Value, limit: usize) -> Result<Vec<Item>, AdapterError> {
        let config: ArxivConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            AdapterError::ConfigurationMissing {
                field: format!("arxiv config: {e}"),
            }
        })?;

        let days_back = config
            .days_back
            .or_else(|| config.date_filter.as_deref().map(date_filter_to_days));
        let raw_query = build_search_query(&config.query, days_back);

        let url = format!(
            "http://export.arxiv.org/api/query?search_query={}&start=0&max_results={limit}&sortBy=submittedDate&sortOrder=descending",
            urlencode(&raw_query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("fetching arxiv: {e}"),
            })?;

        if let Some(err) = classify_status(response.status(), "arxiv") {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("reading arxiv response: {e}"),
            })?;

        parse_atom_entries(&body, limit)
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

/// Parses the ArXiv Atom feed into items, using `feed-rs` since ArXiv's
/// export endpoint is itself a standard Atom document.
fn parse_atom_entries(body: &str, limit: usize) -> Result<Vec<Item>, AdapterError> {
    let parsed = feed_rs::parser::parse(body.as_bytes()).map_err(|e| {
        AdapterError::TransientNetwork {
            message: format!("parsing arxiv response: {e}"),
        }
    })?;

    Ok(parsed
        .entries
        .into_iter()
        .take(limit)
        .map(|entry| Item {
            source_id: entry.id,
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            url: entry.links.first().map(|l| l.href.clone()),
            summary: entry.summary.map(|s| s.content).unwrap_or_default(),
            published_at: entry.published.map(Into::into),
            metadata: std::collections::HashMap::new(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_filter_maps_to_day_counts() {
        assert_eq!(date_filter_to_days("today"), 1);
        assert_eq!(date_filter_to_days("week"), 7);
        assert_eq!(date_filter_to_days("month"), 30);
    }

    #[test]
    fn double_days_back_caps_at_max() {
        assert_eq!(double_days_back(30), 60);
        assert_eq!(double_days_back(60), 90);
        assert_eq!(double_days_back(90), 90);
    }

    #[test]
    fn build_search_query_omits_date_clause_without_days_back() {
        assert_eq!(build_search_query("llm agents", None), "all:llm agents");
    }

    #[test]
    fn build_search_query_includes_submitted_date_range_when_days_back_is_known() {
        let query = build_search_query("llm agents", Some(7));
        assert!(query.starts_with("all:llm agents AND submittedDate:["));
        assert!(query.contains(" TO "));
    }

    #[test]
    fn doubled_retry_window_widens_the_submitted_date_range() {
        let narrow = build_search_query("q", Some(7));
        let wide = build_search_query("q", Some(double_days_back(7)));
        assert_ne!(narrow, wide);
    }
}
