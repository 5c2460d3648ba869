//! CRUD for the `entries` table: individual RSS items already seen from a
//! feed, keyed by the feed's own entry id so re-polling never reprocesses
//! the same item. `is_processed`/`processed_at` implement the read/mark/read
//! round-trip required by spec invariant 5.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A persisted feed entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub entry_id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub categories_json: String,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub seen_at: DateTime<Utc>,
}

/// Fields carried by a freshly-parsed feed item, before it is known whether
/// this feed has seen it already.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub entry_id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub categories_json: String,
}

/// Returns `true` if this feed has already recorded `entry_id`.
pub async fn has_seen(pool: &DbPool, feed_id: i64, entry_id: &str) -> Result<bool, StorageError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM entries WHERE feed_id = ? AND entry_id = ?",
    )
    .bind(feed_id)
    .bind(entry_id)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(count > 0)
}

/// Records a feed entry as seen. Silently no-ops on a duplicate insert (two
/// concurrent polls of the same feed racing to record the same entry) —
/// this is the insert-idempotency the `(feed_id, entry_id)` uniqueness
/// constraint provides (spec §5.c).
pub async fn record_seen(pool: &DbPool, feed_id: i64, entry: &NewEntry) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO entries (feed_id, entry_id, title, link, published_at, author, summary, content, categories_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (feed_id, entry_id) DO NOTHING
        "#,
    )
    .bind(feed_id)
    .bind(&entry.entry_id)
    .bind(&entry.title)
    .bind(&entry.link)
    .bind(entry.published_at)
    .bind(&entry.author)
    .bind(&entry.summary)
    .bind(&entry.content)
    .bind(&entry.categories_json)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Returns up to `limit` entries for `feed_id`, sorted by publish time
/// descending. When `only_unprocessed` is true, already-processed entries
/// are excluded.
pub async fn read(
    pool: &DbPool,
    feed_id: i64,
    limit: i64,
    only_unprocessed: bool,
) -> Result<Vec<Entry>, StorageError> {
    let query = if only_unprocessed {
        "SELECT * FROM entries WHERE feed_id = ? AND is_processed = 0 ORDER BY published_at DESC LIMIT ?"
    } else {
        "SELECT * FROM entries WHERE feed_id = ? ORDER BY published_at DESC LIMIT ?"
    };
    sqlx::query_as::<_, Entry>(query)
        .bind(feed_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Marks the given entry ids as processed. The only mutator of `is_processed`
/// besides [`reset_processed`] (spec §4.B).
pub async fn mark_processed(pool: &DbPool, entry_ids: &[i64]) -> Result<(), StorageError> {
    for id in entry_ids {
        sqlx::query(
            "UPDATE entries SET is_processed = 1, processed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    }
    Ok(())
}

/// Resets `is_processed` to false for every entry of `feed_id`, or for all
/// feeds if `feed_id` is `None`.
pub async fn reset_processed(pool: &DbPool, feed_id: Option<i64>) -> Result<(), StorageError> {
    if let Some(feed_id) = feed_id {
        sqlx::query("UPDATE entries SET is_processed = 0, processed_at = NULL WHERE feed_id = ?")
            .bind(feed_id)
            .execute(pool)
            .await
    } else {
        sqlx::query("UPDATE entries SET is_processed = 0, processed_at = NULL")
            .execute(pool)
            .await
    }
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{feeds, init_test_db, scouts};

    fn entry(id: &str) -> NewEntry {
        NewEntry {
            entry_id: id.to_string(),
            title: Some("Title".to_string()),
            link: None,
            published_at: None,
            author: None,
            summary: None,
            content: None,
            categories_json: "[]".to_string(),
        }
    }

    async fn sample_feed(pool: &DbPool) -> i64 {
        let scout_id = scouts::create(
            pool,
            &scouts::NewScout {
                name: "entry-scout".to_string(),
                kind: "rss".to_string(),
                intent: "generation".to_string(),
                config_json: "{}".to_string(),
                prompt_template: "p".to_string(),
                platform: "twitter".to_string(),
                schedule_cron: "0 * * * *".to_string(),
                llm_provider: None,
                llm_model: None,
            },
        )
        .await
        .unwrap()
        .id;
        feeds::get_or_create(pool, scout_id, "https://example.com/rss")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn record_seen_then_has_seen() {
        let pool = init_test_db().await.unwrap();
        let feed_id = sample_feed(&pool).await;

        assert!(!has_seen(&pool, feed_id, "entry-1").await.unwrap());
        record_seen(&pool, feed_id, &entry("entry-1")).await.unwrap();
        assert!(has_seen(&pool, feed_id, "entry-1").await.unwrap());
    }

    #[tokio::test]
    async fn recording_the_same_entry_twice_does_not_error() {
        let pool = init_test_db().await.unwrap();
        let feed_id = sample_feed(&pool).await;

        record_seen(&pool, feed_id, &entry("entry-1")).await.unwrap();
        record_seen(&pool, feed_id, &entry("entry-1")).await.unwrap();

        let all = read(&pool, feed_id, 10, false).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn read_mark_read_round_trip() {
        let pool = init_test_db().await.unwrap();
        let feed_id = sample_feed(&pool).await;
        for i in 0..3 {
            record_seen(&pool, feed_id, &entry(&format!("entry-{i}"))).await.unwrap();
        }

        let unprocessed = read(&pool, feed_id, 3, true).await.unwrap();
        assert_eq!(unprocessed.len(), 3);

        let ids: Vec<i64> = unprocessed.iter().map(|e| e.id).collect();
        mark_processed(&pool, &ids).await.unwrap();

        let remaining_unprocessed = read(&pool, feed_id, 3, true).await.unwrap();
        assert_eq!(remaining_unprocessed.len(), 0);

        let all = read(&pool, feed_id, 3, false).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn reset_processed_restores_unprocessed_state() {
        let pool = init_test_db().await.unwrap();
        let feed_id = sample_feed(&pool).await;
        record_seen(&pool, feed_id, &entry("entry-1")).await.unwrap();
        let all = read(&pool, feed_id, 1, false).await.unwrap();
        mark_processed(&pool, &[all[0].id]).await.unwrap();

        reset_processed(&pool, Some(feed_id)).await.unwrap();

        let unprocessed = read(&pool, feed_id, 1, true).await.unwrap();
        assert_eq!(unprocessed.len(), 1);
    }
}
