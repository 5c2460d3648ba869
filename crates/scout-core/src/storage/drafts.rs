//! CRUD for the `drafts` table: the `pending_review -> reviewing ->
//! posted|rejected` state machine the Review Bus drives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A draft's position in the review state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStatus {
    PendingReview,
    Reviewing,
    Posted,
    Rejected,
}

impl DraftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DraftStatus::PendingReview => "pending_review",
            DraftStatus::Reviewing => "reviewing",
            DraftStatus::Posted => "posted",
            DraftStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<DraftStatus> {
        match s {
            "pending_review" => Some(DraftStatus::PendingReview),
            "reviewing" => Some(DraftStatus::Reviewing),
            "posted" => Some(DraftStatus::Posted),
            "rejected" => Some(DraftStatus::Rejected),
            _ => None,
        }
    }
}

/// A persisted draft row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Draft {
    pub id: i64,
    pub scout_id: i64,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub sources_json: String,
    pub image_path: Option<String>,
    pub platform: String,
    pub status: String,
    pub review_note: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn status(&self) -> Option<DraftStatus> {
        DraftStatus::parse(&self.status)
    }
}

/// Fields accepted when enqueuing a new draft for review.
#[derive(Debug, Clone)]
pub struct NewDraft {
    pub scout_id: i64,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub sources_json: String,
    pub image_path: Option<String>,
    pub platform: String,
}

/// Enqueues a draft in `pending_review` state.
pub async fn enqueue(pool: &DbPool, new: &NewDraft) -> Result<Draft, StorageError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO drafts (scout_id, title, body, url, summary, sources_json, image_path, platform, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending_review')
        RETURNING id
        "#,
    )
    .bind(new.scout_id)
    .bind(&new.title)
    .bind(&new.body)
    .bind(&new.url)
    .bind(&new.summary)
    .bind(&new.sources_json)
    .bind(&new.image_path)
    .bind(&new.platform)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    get_by_id(pool, id)
        .await?
        .ok_or_else(|| StorageError::NotFound {
            message: format!("draft {id} vanished after insert"),
        })
}

/// Fetches a draft by id.
pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Draft>, StorageError> {
    sqlx::query_as::<_, Draft>("SELECT * FROM drafts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Lists drafts in `pending_review` state, in insertion order (by primary
/// key) — the order the Review Bus's poll cycle processes them in (spec §5).
pub async fn list_pending(pool: &DbPool) -> Result<Vec<Draft>, StorageError> {
    sqlx::query_as::<_, Draft>("SELECT * FROM drafts WHERE status = 'pending_review' ORDER BY id ASC")
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Moves a draft from `pending_review` to `reviewing`, guarding against a
/// concurrent reviewer picking up the same item. Returns `Ok(false)` if the
/// draft was not in `pending_review`.
pub async fn claim_for_review(pool: &DbPool, id: i64) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'reviewing', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ? AND status = 'pending_review'",
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(result.rows_affected() == 1)
}

/// Marks a draft `rejected` from `reviewing`, recording an optional reviewer
/// note. Returns `false` if the draft was not in `reviewing` — the Review
/// Bus's at-most-once terminal transition guarantee (spec §4.G).
pub async fn reject(pool: &DbPool, id: i64, note: Option<&str>) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'rejected', review_note = COALESCE(?, review_note), updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ? AND status = 'reviewing'",
    )
    .bind(note)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(result.rows_affected() == 1)
}

/// Marks a draft `posted` from `reviewing`, records the posting time, and
/// stamps the publisher's external id. `external_id` is `None` for
/// notify-only platforms, which have nothing to report back. Returns
/// `false` if the draft was not in `reviewing`.
pub async fn mark_posted(
    pool: &DbPool,
    id: i64,
    external_id: Option<&str>,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'posted', posted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), external_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ? AND status = 'reviewing'",
    )
    .bind(external_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(result.rows_affected() == 1)
}

/// Returns a draft to `pending_review` (e.g. after a failed publish attempt).
pub async fn return_to_pending(pool: &DbPool, id: i64) -> Result<(), StorageError> {
    set_status(pool, id, DraftStatus::PendingReview, None).await
}

/// Overwrites the draft's body text (used by the refine action).
pub async fn update_body(pool: &DbPool, id: i64, body: &str) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE drafts SET body = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(body)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            message: format!("draft {id} not found"),
        });
    }
    Ok(())
}

async fn set_status(
    pool: &DbPool,
    id: i64,
    status: DraftStatus,
    note: Option<&str>,
) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE drafts SET status = ?, review_note = COALESCE(?, review_note), updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(note)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            message: format!("draft {id} not found"),
        });
    }
    Ok(())
}
