use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index schema. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Child vectors: one row per embedded child segment
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS child_vectors (
            child_id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Parents: only written when storage.persist_parents is on
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parents (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_child_vectors_parent ON child_vectors(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}
