//! RSS/Atom adapter. The only adapter that persists what it fetches: the
//! upstream feed is the authoritative stream of "events seen" (spec §4.B).
//!
//! `poll` parses the remote document and inserts every previously-unseen
//! [`Entry`](crate::storage::entries::Entry); `read` returns stored entries;
//! `mark_processed`/`reset_processed` are the only mutators of
//! `is_processed`. [`SourceAdapter::fetch`] composes poll+read for callers
//! that just want "the next N items".

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AdapterError;
use crate::source::{build_http_client, classify_status, Item, SourceAdapter};
use crate::storage::entries::{self, NewEntry};
use crate::storage::feeds;
use crate::storage::DbPool;

/// `rss` scout config: `{"feeds": [url, ...]}` (spec §6).
#[derive(Debug, Deserialize)]
struct RssConfig {
    feeds: Vec<String>,
}

/// RSS/Atom source adapter, backed by `feed-rs` for parsing and the
/// `feeds`/`entries` tables for persistence.
pub struct RssAdapter {
    pool: DbPool,
    client: reqwest::Client,
}

impl RssAdapter {
    pub fn new(pool: DbPool) -> Self {
        RssAdapter {
            pool,
            client: build_http_client(std::time::Duration::from_secs(30)),
        }
    }

    /// Parses the remote document at `url`, inserts every previously-unseen
    /// entry keyed by the feed's own entry id, and updates `last_polled_at`.
    pub async fn poll(&self, scout_id: i64, url: &str) -> Result<usize, AdapterError> {
        let feed_row = feeds::get_or_create(&self.pool, scout_id, url)
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("storage error registering feed: {e}"),
            })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("fetching {url}: {e}"),
            })?;

        if let Some(err) = classify_status(response.status(), url) {
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("reading body of {url}: {e}"),
            })?;

        let parsed = feed_rs::parser::parse(&bytes[..]).map_err(|e| AdapterError::TransientNetwork {
            message: format!("parsing feed {url}: {e}"),
        })?;

        let mut inserted = 0;
        for entry in parsed.entries {
            let entry_id = entry.id.clone();
            let title = entry.title.map(|t| t.content);
            let link = entry.links.first().map(|l| l.href.clone());
            let published_at = entry.published.map(Into::into);
            let author = entry.authors.first().map(|a| a.name.clone());
            let summary = entry.summary.map(|s| s.content);
            let content = entry.content.and_then(|c| c.body);
            let categories_json = serde_json::to_string(
                &entry
                    .categories
                    .iter()
                    .map(|c| c.term.clone())
                    .collect::<Vec<_>>(),
            )
            .unwrap_or_else(|_| "[]".to_string());

            if !entries::has_seen(&self.pool, feed_row.id, &entry_id)
                .await
                .unwrap_or(false)
            {
                inserted += 1;
            }

            entries::record_seen(
                &self.pool,
                feed_row.id,
                &NewEntry {
                    entry_id,
                    title,
                    link,
                    published_at,
                    author,
                    summary,
                    content,
                    categories_json,
                },
            )
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("storage error recording entry: {e}"),
            })?;
        }

        feeds::mark_polled(&self.pool, feed_row.id)
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("storage error marking feed polled: {e}"),
            })?;

        Ok(inserted)
    }

    /// Returns up to `limit` stored entries for `feed_url`, sorted by
    /// publish time descending.
    pub async fn read(
        &self,
        scout_id: i64,
        feed_url: &str,
        limit: usize,
        only_unprocessed: bool,
    ) -> Result<Vec<Item>, AdapterError> {
        let feed_row = feeds::get_or_create(&self.pool, scout_id, feed_url)
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("storage error: {e}"),
            })?;

        let rows = entries::read(&self.pool, feed_row.id, limit as i64, only_unprocessed)
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("storage error: {e}"),
            })?;

        Ok(rows.into_iter().map(entry_to_item).collect())
    }

    /// Marks the given entries processed. The executor calls this once it
    /// has finished generating drafts from them.
    pub async fn mark_processed(&self, entry_ids: &[i64]) -> Result<(), AdapterError> {
        entries::mark_processed(&self.pool, entry_ids)
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("storage error: {e}"),
            })
    }
}

fn entry_to_item(entry: crate::storage::entries::Entry) -> Item {
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("entry_db_id".to_string(), entry.id.to_string());
    if let Some(author) = &entry.author {
        metadata.insert("author".to_string(), author.clone());
    }
    Item {
        source_id: entry.entry_id,
        title: entry.title.unwrap_or_default(),
        url: entry.link,
        summary: entry.summary.or(entry.content).unwrap_or_default(),
        published_at: entry.published_at,
        metadata,
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn name(&self) -> &'static str {
        "rss"
    }

    async fn fetch(&self, cfg: &serde_json::Value, limit: usize) -> Result<Vec<Item>, AdapterError> {
        let config: RssConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            AdapterError::ConfigurationMissing {
                field: format!("rss config: {e}"),
            }
        })?;

        // `scout_id` is embedded in the config by the Executor before this
        // is called; see `Scout.config_json` assembly in `crate::workflow`.
        let scout_id = cfg
            .get("scout_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AdapterError::ConfigurationMissing {
                field: "rss config: scout_id".to_string(),
            })?;

        let mut items = Vec::new();
        for feed_url in &config.feeds {
            self.poll(scout_id, feed_url).await?;
            let mut fetched = self.read(scout_id, feed_url, limit, true).await?;
            items.append(&mut fetched);
            if items.len() >= limit {
                break;
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}
