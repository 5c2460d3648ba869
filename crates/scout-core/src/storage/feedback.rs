//! CRUD for the `feedback` table: an append-only journal of human review
//! decisions, the raw material the calibration step reduces over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A human review decision, recorded against the scout whose draft it concerns.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub scout_id: i64,
    pub draft_id: Option<i64>,
    pub action: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Appends a feedback row.
pub async fn record(
    pool: &DbPool,
    scout_id: i64,
    draft_id: Option<i64>,
    action: &str,
    note: Option<&str>,
) -> Result<Feedback, StorageError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO feedback (scout_id, draft_id, action, note) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(scout_id)
    .bind(draft_id)
    .bind(action)
    .bind(note)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    sqlx::query_as::<_, Feedback>("SELECT * FROM feedback WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Lists all feedback for a scout, oldest first.
pub async fn list_for_scout(pool: &DbPool, scout_id: i64) -> Result<Vec<Feedback>, StorageError> {
    sqlx::query_as::<_, Feedback>(
        "SELECT * FROM feedback WHERE scout_id = ? ORDER BY created_at ASC",
    )
    .bind(scout_id)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{init_test_db, scouts};

    async fn sample_scout(pool: &DbPool) -> i64 {
        scouts::create(
            pool,
            &scouts::NewScout {
                name: "feedback-scout".to_string(),
                kind: "feed".to_string(),
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
        .id
    }

    #[tokio::test]
    async fn record_and_list() {
        let pool = init_test_db().await.unwrap();
        let scout_id = sample_scout(&pool).await;

        record(&pool, scout_id, None, "approve", None).await.unwrap();
        record(&pool, scout_id, None, "reject", Some("too long")).await.unwrap();

        let rows = list_for_scout(&pool, scout_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].note.as_deref(), Some("too long"));
    }
}
