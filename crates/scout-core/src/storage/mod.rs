//! SQLite persistence layer: pool setup, migrations, and per-entity query
//! modules mirroring the tables created in `migrations/`.

pub mod calibrations;
pub mod drafts;
pub mod entries;
pub mod feedback;
pub mod feeds;
pub mod fingerprints;
pub mod scouts;

use std::path::PathBuf;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::config::expand_tilde;
use crate::error::StorageError;

/// Pool type shared across every query module.
pub type DbPool = SqlitePool;

/// Opens (creating if necessary) the SQLite database at `db_path`, applies
/// pragmas for durability under concurrent access, and runs embedded
/// migrations.
pub async fn init_db(db_path: &str, max_connections: u32) -> Result<DbPool, StorageError> {
    let expanded = expand_tilde(db_path);
    if let Some(parent) = expanded.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
            source: sqlx::Error::Io(e),
        })?;
    }

    let options = connect_options(&expanded)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .connect_with(options)
        .await
        .map_err(|source| StorageError::Connection { source })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|source| StorageError::Migration { source })?;

    Ok(pool)
}

fn connect_options(path: &PathBuf) -> Result<SqliteConnectOptions, StorageError> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map(|opts| {
            opts.create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        })
        .map_err(|source| StorageError::Connection { source })
}

/// Opens an in-memory database and runs migrations, for use in tests.
#[cfg(any(test, feature = "test-helpers"))]
pub async fn init_test_db() -> Result<DbPool, StorageError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|source| StorageError::Connection { source })?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|source| StorageError::Connection { source })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|source| StorageError::Migration { source })?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_test_db_creates_expected_tables() {
        let pool = init_test_db().await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
        for expected in [
            "scouts",
            "drafts",
            "fingerprints",
            "feeds",
            "entries",
            "feedback",
            "calibrations",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn init_test_db_is_idempotent_about_added_columns() {
        let pool = init_test_db().await.unwrap();
        let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as("PRAGMA table_info(scouts)")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<String> = columns.into_iter().map(|c| c.1).collect();
        assert!(names.contains(&"last_run_at".to_string()));
        assert!(names.contains(&"last_run_status".to_string()));
    }
}
