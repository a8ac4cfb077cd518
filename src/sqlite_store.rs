//! SQLite-backed [`VectorIndex`] and [`ParentStore`].
//!
//! Vectors are stored as little-endian `f32` blobs in `child_vectors` and
//! searched brute-force in process. `index_meta` records which embedding
//! model produced the vectors so a model change can invalidate them.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use documentor_core::embedding::{blob_to_vec, vec_to_blob};
use documentor_core::models::{ChildMatch, IndexEntry, Metadata, Segment};
use documentor_core::store::memory::top_k;
use documentor_core::store::{ParentStore, VectorIndex};
use documentor_core::{RagError, Result};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "embedding_dims";
const META_COMPLETE: &str = "ingest_complete";

fn store_err(e: impl std::fmt::Display) -> RagError {
    RagError::Store(e.to_string())
}

fn metadata_to_json(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata).map_err(store_err)
}

fn metadata_from_json(json: &str) -> Result<Metadata> {
    serde_json::from_str(json).map_err(store_err)
}

/// Child vectors in the `child_vectors` table.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO child_vectors (child_id, parent_id, text, metadata_json, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.child_id)
            .bind(&entry.parent_id)
            .bind(&entry.text)
            .bind(metadata_to_json(&entry.metadata)?)
            .bind(entry.vector.len() as i64)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ChildMatch>> {
        let rows = sqlx::query(
            "SELECT child_id, parent_id, text, embedding FROM child_vectors ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let entries: Vec<IndexEntry> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexEntry {
                    child_id: row.get("child_id"),
                    parent_id: row.get("parent_id"),
                    text: row.get("text"),
                    metadata: Metadata::new(),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(top_k(query, entries.iter(), k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM child_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM child_vectors")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

/// Parents in the `parents` table.
pub struct SqliteParentStore {
    pool: SqlitePool,
}

impl SqliteParentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParentStore for SqliteParentStore {
    async fn put(&self, parents: &[Segment]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for parent in parents {
            sqlx::query(
                r#"
                INSERT INTO parents (id, text, metadata_json) VALUES (?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&parent.id)
            .bind(&parent.text)
            .bind(metadata_to_json(&parent.metadata)?)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Segment>> {
        let row = sqlx::query("SELECT id, text, metadata_json FROM parents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let metadata_json: String = row.get("metadata_json");
        Ok(Some(Segment {
            id: row.get("id"),
            parent_id: None,
            text: row.get("text"),
            metadata: metadata_from_json(&metadata_json)?,
        }))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parents")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM parents")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

async fn read_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(store_err)
}

async fn write_meta(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO index_meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

/// Make sure stored vectors came from `model` with `dims` dimensions.
///
/// On a mismatch every table is cleared. The current model is recorded
/// either way. Returns `false` if stale data was dropped.
pub async fn ensure_embedding_model(pool: &SqlitePool, model: &str, dims: usize) -> Result<bool> {
    let recorded_model = read_meta(pool, META_MODEL).await?;
    let recorded_dims = read_meta(pool, META_DIMS).await?;
    let dims_str = dims.to_string();

    let compatible = match (&recorded_model, &recorded_dims) {
        (Some(m), Some(d)) => m == model && *d == dims_str,
        _ => true,
    };

    if !compatible {
        warn!(
            recorded = recorded_model.as_deref().unwrap_or(""),
            configured = model,
            "embedding model changed, discarding persisted index"
        );
        clear_all(pool).await?;
    }

    write_meta(pool, META_MODEL, model).await?;
    write_meta(pool, META_DIMS, &dims_str).await?;
    Ok(compatible)
}

/// Record whether the stored index is the result of a finished ingestion.
pub async fn set_ingest_complete(pool: &SqlitePool, complete: bool) -> Result<()> {
    write_meta(pool, META_COMPLETE, if complete { "1" } else { "0" }).await
}

/// `true` only when the last ingestion into this index ran to the end.
pub async fn is_ingest_complete(pool: &SqlitePool) -> Result<bool> {
    Ok(read_meta(pool, META_COMPLETE).await?.as_deref() == Some("1"))
}

/// Delete every vector and parent row.
pub async fn clear_all(pool: &SqlitePool) -> Result<()> {
    set_ingest_complete(pool, false).await?;
    sqlx::query("DELETE FROM child_vectors")
        .execute(pool)
        .await
        .map_err(store_err)?;
    sqlx::query("DELETE FROM parents")
        .execute(pool)
        .await
        .map_err(store_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use documentor_core::models::{Document, META_SOURCE};

    async fn pool(dir: &tempfile::TempDir) -> SqlitePool {
        let pool = db::connect(&dir.path().join("index.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn entry(child: &str, parent: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            child_id: child.to_string(),
            parent_id: parent.to_string(),
            text: child.to_string(),
            metadata: Document::new("").with_metadata(META_SOURCE, "a.pdf").metadata,
            vector,
        }
    }

    #[tokio::test]
    async fn vectors_round_trip_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteVectorIndex::new(pool(&dir).await);
        index
            .add(&[
                entry("c1", "p1", vec![1.0, 0.0]),
                entry("c2", "p2", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        let hits = index.search(&[0.1, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].child_id, "c2");
        assert_eq!(hits[0].parent_id, "p2");

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn parents_keep_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteParentStore::new(pool(&dir).await);
        let parent = Segment {
            id: "p1".to_string(),
            parent_id: None,
            text: "Opportunity cost".to_string(),
            metadata: Document::new("")
                .with_metadata(META_SOURCE, "econ.pdf")
                .with_metadata("page", 2i64)
                .metadata,
        };
        store.put(std::slice::from_ref(&parent)).await.unwrap();
        store.put(std::slice::from_ref(&parent)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("p1").await.unwrap(), Some(parent));
        assert!(store.get("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn model_change_clears_index() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        assert!(ensure_embedding_model(&pool, "all-minilm-l6-v2", 384).await.unwrap());

        let index = SqliteVectorIndex::new(pool.clone());
        index.add(&[entry("c1", "p1", vec![1.0])]).await.unwrap();

        assert!(ensure_embedding_model(&pool, "all-minilm-l6-v2", 384).await.unwrap());
        assert_eq!(index.count().await.unwrap(), 1);

        assert!(!ensure_embedding_model(&pool, "bge-base-en-v1.5", 768).await.unwrap());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn completion_marker_is_reset_by_clear() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        assert!(!is_ingest_complete(&pool).await.unwrap());

        set_ingest_complete(&pool, true).await.unwrap();
        assert!(is_ingest_complete(&pool).await.unwrap());

        clear_all(&pool).await.unwrap();
        assert!(!is_ingest_complete(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_parent_metadata_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        sqlx::query("INSERT INTO parents (id, text, metadata_json) VALUES ('p1', 'text', '{not json')")
            .execute(&pool)
            .await
            .unwrap();

        let err = SqliteParentStore::new(pool).get("p1").await.unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
    }
}
