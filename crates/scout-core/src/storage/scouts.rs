//! CRUD for the `scouts` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A persisted scout row: the declarative unit of work the scheduler dispatches.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scout {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub intent: String,
    pub config_json: String,
    pub prompt_template: String,
    pub platform: String,
    pub schedule_cron: String,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<String>,
}

/// Fields accepted when creating a new scout.
#[derive(Debug, Clone)]
pub struct NewScout {
    pub name: String,
    pub kind: String,
    pub intent: String,
    pub config_json: String,
    pub prompt_template: String,
    pub platform: String,
    pub schedule_cron: String,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

/// Inserts a new scout. Fails with [`StorageError::AlreadyExists`] if `name` is taken.
pub async fn create(pool: &DbPool, new: &NewScout) -> Result<Scout, StorageError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO scouts (name, kind, intent, config_json, prompt_template, platform, schedule_cron, llm_provider, llm_model)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&new.name)
    .bind(&new.kind)
    .bind(&new.intent)
    .bind(&new.config_json)
    .bind(&new.prompt_template)
    .bind(&new.platform)
    .bind(&new.schedule_cron)
    .bind(&new.llm_provider)
    .bind(&new.llm_model)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StorageError::AlreadyExists {
                message: format!("scout named '{}' already exists", new.name),
            }
        }
        _ => StorageError::Query { source: e },
    })?;

    get_by_id(pool, id)
        .await?
        .ok_or_else(|| StorageError::NotFound {
            message: format!("scout {id} vanished after insert"),
        })
}

/// Fetches a scout by id, or `None` if it does not exist.
pub async fn get_by_id(pool: &DbPool, id: i64) -> Result<Option<Scout>, StorageError> {
    sqlx::query_as::<_, Scout>("SELECT * FROM scouts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Fetches a scout by its unique name.
pub async fn get_by_name(pool: &DbPool, name: &str) -> Result<Option<Scout>, StorageError> {
    sqlx::query_as::<_, Scout>("SELECT * FROM scouts WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Lists all scouts, optionally filtered to only enabled ones.
pub async fn list(pool: &DbPool, enabled_only: bool) -> Result<Vec<Scout>, StorageError> {
    let query = if enabled_only {
        "SELECT * FROM scouts WHERE enabled = 1 ORDER BY name"
    } else {
        "SELECT * FROM scouts ORDER BY name"
    };
    sqlx::query_as::<_, Scout>(query)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Updates a scout's prompt template (used by calibration refinement).
pub async fn update_prompt_template(
    pool: &DbPool,
    id: i64,
    prompt_template: &str,
) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE scouts SET prompt_template = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(prompt_template)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            message: format!("scout {id} not found"),
        });
    }
    Ok(())
}

/// Records the outcome of the most recent run.
pub async fn record_run(
    pool: &DbPool,
    id: i64,
    status: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE scouts SET last_run_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), last_run_status = ? WHERE id = ?",
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Enables or disables a scout. The scheduler picks up the change on its
/// next rescan (spec §4.F); it does not interrupt a run already in flight.
pub async fn set_enabled(pool: &DbPool, id: i64, enabled: bool) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE scouts SET enabled = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(enabled)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            message: format!("scout {id} not found"),
        });
    }
    Ok(())
}

/// Deletes a scout. Cascades to drafts, fingerprints, feeds, feedback, and
/// calibrations via the foreign key constraints declared in the migrations.
pub async fn delete(pool: &DbPool, id: i64) -> Result<(), StorageError> {
    let result = sqlx::query("DELETE FROM scouts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            message: format!("scout {id} not found"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    fn sample() -> NewScout {
        NewScout {
            name: "hn-frontpage".to_string(),
            kind: "feed".to_string(),
            intent: "generation".to_string(),
            config_json: r#"{"feeds":["https://news.ycombinator.com/rss"]}"#.to_string(),
            prompt_template: "Summarize the top stories.".to_string(),
            platform: "twitter".to_string(),
            schedule_cron: "0 */6 * * *".to_string(),
            llm_provider: None,
            llm_model: None,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_round_trip() {
        let pool = init_test_db().await.unwrap();
        let created = create(&pool, &sample()).await.unwrap();
        assert_eq!(created.name, "hn-frontpage");
        assert!(created.enabled);

        let fetched = get_by_id(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, created.name);

        let by_name = get_by_name(&pool, "hn-frontpage").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let pool = init_test_db().await.unwrap();
        create(&pool, &sample()).await.unwrap();
        let err = create(&pool, &sample()).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn delete_cascades_to_feedback() {
        let pool = init_test_db().await.unwrap();
        let scout = create(&pool, &sample()).await.unwrap();
        sqlx::query("INSERT INTO feedback (scout_id, action) VALUES (?, 'approve')")
            .bind(scout.id)
            .execute(&pool)
            .await
            .unwrap();

        delete(&pool, scout.id).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE scout_id = ?")
            .bind(scout.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn set_enabled_toggles_flag() {
        let pool = init_test_db().await.unwrap();
        let scout = create(&pool, &sample()).await.unwrap();
        assert!(scout.enabled);

        set_enabled(&pool, scout.id, false).await.unwrap();
        let fetched = get_by_id(&pool, scout.id).await.unwrap().unwrap();
        assert!(!fetched.enabled);

        set_enabled(&pool, scout.id, true).await.unwrap();
        let fetched = get_by_id(&pool, scout.id).await.unwrap().unwrap();
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn set_enabled_unknown_scout_errors() {
        let pool = init_test_db().await.unwrap();
        let err = set_enabled(&pool, 999, false).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn record_run_updates_status() {
        let pool = init_test_db().await.unwrap();
        let scout = create(&pool, &sample()).await.unwrap();
        record_run(&pool, scout.id, "success").await.unwrap();
        let fetched = get_by_id(&pool, scout.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_run_status.as_deref(), Some("success"));
        assert!(fetched.last_run_at.is_some());
    }
}
