use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::StorageConfig;
use crate::migrate;

/// Open (creating if missing) the SQLite file at `db_path` in WAL mode.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open the persisted index with an up-to-date schema.
///
/// Returns `None` when `storage.persist_dir` is unset and everything lives
/// in memory.
pub async fn open_index(storage: &StorageConfig) -> Result<Option<SqlitePool>> {
    let Some(db_path) = storage.db_path() else {
        return Ok(None);
    };
    let pool = connect(&db_path).await?;
    migrate::run_migrations(&pool).await?;
    debug!(path = %db_path.display(), "opened persisted index");
    Ok(Some(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_storage_opens_nothing() {
        let storage = StorageConfig {
            persist_dir: None,
            persist_parents: false,
        };
        assert!(open_index(&storage).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_index_creates_directory_and_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            persist_dir: Some(tmp.path().join("nested/vector_db")),
            persist_parents: true,
        };
        let pool = open_index(&storage).await.unwrap().unwrap();
        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('child_vectors', 'parents', 'index_meta')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 3);
        assert!(tmp.path().join("nested/vector_db/index.sqlite").exists());
    }
}
