//! CRUD for the `calibrations` table: meta-prompt refinements derived from
//! accumulated feedback, mirroring `apply_calibration_feedback`'s silent
//! keep-old-on-failure behavior one layer up in [`crate::feedback`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A recorded calibration attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Calibration {
    pub id: i64,
    pub scout_id: i64,
    pub previous_prompt: String,
    pub new_prompt: String,
    pub feedback_count: i64,
    pub applied: bool,
    pub created_at: DateTime<Utc>,
}

/// Records a calibration attempt and whether it was applied to the scout's
/// live prompt template.
pub async fn record(
    pool: &DbPool,
    scout_id: i64,
    previous_prompt: &str,
    new_prompt: &str,
    feedback_count: i64,
    applied: bool,
) -> Result<Calibration, StorageError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO calibrations (scout_id, previous_prompt, new_prompt, feedback_count, applied)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(scout_id)
    .bind(previous_prompt)
    .bind(new_prompt)
    .bind(feedback_count)
    .bind(applied)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    sqlx::query_as::<_, Calibration>("SELECT * FROM calibrations WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Returns the most recent applied calibration for a scout, if any.
pub async fn latest_applied(
    pool: &DbPool,
    scout_id: i64,
) -> Result<Option<Calibration>, StorageError> {
    sqlx::query_as::<_, Calibration>(
        "SELECT * FROM calibrations WHERE scout_id = ? AND applied = 1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(scout_id)
    .fetch_optional(pool)
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
                name: "calibration-scout".to_string(),
                kind: "feed".to_string(),
                intent: "generation".to_string(),
                config_json: "{}".to_string(),
                prompt_template: "original prompt".to_string(),
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
    async fn latest_applied_ignores_unapplied_attempts() {
        let pool = init_test_db().await.unwrap();
        let scout_id = sample_scout(&pool).await;

        record(&pool, scout_id, "original prompt", "failed rewrite", 5, false)
            .await
            .unwrap();
        assert!(latest_applied(&pool, scout_id).await.unwrap().is_none());

        record(&pool, scout_id, "original prompt", "better prompt", 5, true)
            .await
            .unwrap();
        let latest = latest_applied(&pool, scout_id).await.unwrap().unwrap();
        assert_eq!(latest.new_prompt, "better prompt");
    }
}
