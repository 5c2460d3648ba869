//! CRUD for the `fingerprints` table: the hash/embedding/provenance triple
//! the dedup store checks new items and drafts against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;
use crate::storage::DbPool;

/// A persisted content fingerprint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Fingerprint {
    pub id: i64,
    pub scout_id: Option<i64>,
    pub content_hash: String,
    pub embedding_json: Option<String>,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
}

/// Inserts a fingerprint. `embedding` is `None` when the semantic backend is disabled.
pub async fn insert(
    pool: &DbPool,
    scout_id: Option<i64>,
    content_hash: &str,
    embedding: Option<&[f32]>,
    source_type: &str,
) -> Result<Fingerprint, StorageError> {
    let embedding_json = embedding
        .map(serde_json::to_string)
        .transpose()
        .expect("Vec<f32> always serializes");

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO fingerprints (scout_id, content_hash, embedding_json, source_type)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(scout_id)
    .bind(content_hash)
    .bind(&embedding_json)
    .bind(source_type)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    sqlx::query_as::<_, Fingerprint>("SELECT * FROM fingerprints WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Returns `true` if a fingerprint with this exact content hash already exists.
pub async fn exists_by_hash(pool: &DbPool, content_hash: &str) -> Result<bool, StorageError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fingerprints WHERE content_hash = ?")
        .bind(content_hash)
        .fetch_one(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(count > 0)
}

/// Loads every stored embedding for similarity comparison, optionally scoped
/// to one scout. Rows with no embedding (semantic backend was disabled when
/// they were inserted) are skipped.
pub async fn load_embeddings(
    pool: &DbPool,
    scout_id: Option<i64>,
) -> Result<Vec<Vec<f32>>, StorageError> {
    let rows: Vec<(Option<String>,)> = if let Some(scout_id) = scout_id {
        sqlx::query_as(
            "SELECT embedding_json FROM fingerprints WHERE scout_id = ? AND embedding_json IS NOT NULL",
        )
        .bind(scout_id)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as("SELECT embedding_json FROM fingerprints WHERE embedding_json IS NOT NULL")
            .fetch_all(pool)
            .await
    }
    .map_err(|source| StorageError::Query { source })?;

    Ok(rows
        .into_iter()
        .filter_map(|(json,)| json)
        .filter_map(|json| serde_json::from_str::<Vec<f32>>(&json).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn insert_and_check_exact_hash() {
        let pool = init_test_db().await.unwrap();
        insert(&pool, None, "abc123", None, "retrieved")
            .await
            .unwrap();

        assert!(exists_by_hash(&pool, "abc123").await.unwrap());
        assert!(!exists_by_hash(&pool, "def456").await.unwrap());
    }

    #[tokio::test]
    async fn load_embeddings_skips_null_rows() {
        let pool = init_test_db().await.unwrap();
        insert(&pool, None, "hash-with-embedding", Some(&[0.1, 0.2, 0.3]), "retrieved")
            .await
            .unwrap();
        insert(&pool, None, "hash-without-embedding", None, "retrieved")
            .await
            .unwrap();

        let embeddings = load_embeddings(&pool, None).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0], vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn load_embeddings_scoped_to_scout() {
        let pool = init_test_db().await.unwrap();
        insert(&pool, Some(1), "a", Some(&[1.0]), "retrieved")
            .await
            .unwrap();
        insert(&pool, Some(2), "b", Some(&[2.0]), "retrieved")
            .await
            .unwrap();

        let embeddings = load_embeddings(&pool, Some(1)).await.unwrap();
        assert_eq!(embeddings, vec![vec![1.0]]);
    }
}
