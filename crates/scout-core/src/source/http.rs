//! HTTP-scrape adapter: a stateless single-page read. No retry perturbation
//! exists for this kind — the Executor abandons retries immediately on
//! failure (spec §4.E.6).

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::error::AdapterError;
use crate::source::{build_http_client, classify_status, Item, SourceAdapter};

/// `http` scout config: `{"url": string}` (spec §6).
#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: String,
}

pub struct HttpAdapter {
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new() -> Self {
        HttpAdapter {
            client: build_http_client(std::time::Duration::from_secs(20)),
        }
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    fn name(&self) -> &'static str {
        "http_request"
    }

    async fn fetch(&self, cfg: &serde_json::Value, _limit: usize) -> Result<Vec<Item>, AdapterError> {
        let config: HttpConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            AdapterError::ConfigurationMissing {
                field: format!("http config: {e}"),
            }
        })?;

        let response = self
            .client
            .get(&config.url)
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("fetching {}: {e}", config.url),
            })?;

        if let Some(err) = classify_status(response.status(), &config.url) {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("reading body of {}: {e}", config.url),
            })?;

        let (title, text) = extract_title_and_text(&body);

        Ok(vec![Item {
            source_id: config.url.clone(),
            title,
            url: Some(config.url),
            summary: text,
            published_at: None,
            metadata: std::collections::HashMap::new(),
        }])
    }
}

fn extract_title_and_text(html: &str) -> (String, String) {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").expect("static selector is valid");
    let body_selector = Selector::parse("body").expect("static selector is valid");

    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();

    let text: String = document
        .select(&body_selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    // Cap the extracted body so a large page doesn't blow the prompt budget.
    let truncated: String = text.chars().take(4000).collect();

    (title.trim().to_string(), truncated.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_title_and_text_reads_page() {
        let html = "<html><head><title>Hi</title></head><body><p>Hello world</p></body></html>";
        let (title, text) = extract_title_and_text(html);
        assert_eq!(title, "Hi");
        assert!(text.contains("Hello world"));
    }
}
