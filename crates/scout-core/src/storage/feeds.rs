//! CRUD for the `feeds` table: RSS/Atom sources polled by feed-kind scouts.
//! A feed is keyed by `url` alone — two scouts naming the same URL share
//! one row (and its `entries`), so the feed is polled and stored once no
//! matter how many scouts read from it (spec §3, §5(c)).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A persisted feed subscription. `scout_id` records whichever scout first
/// registered the URL and is nullable: it is informational provenance,
/// not ownership, and is cleared (not cascaded) if that scout is deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub scout_id: Option<i64>,
    pub url: String,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Returns the feed row for `url`, creating it (attributed to `scout_id`)
/// if no scout has registered this URL yet.
pub async fn get_or_create(pool: &DbPool, scout_id: i64, url: &str) -> Result<Feed, StorageError> {
    if let Some(existing) = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })?
    {
        return Ok(existing);
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO feeds (scout_id, url) VALUES (?, ?) RETURNING id",
    )
    .bind(scout_id)
    .bind(url)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Stamps the feed's `last_polled_at` to now.
pub async fn mark_polled(pool: &DbPool, feed_id: i64) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE feeds SET last_polled_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(feed_id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}
