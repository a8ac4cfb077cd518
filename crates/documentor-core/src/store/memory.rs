//! In-memory [`VectorIndex`] and [`ParentStore`] implementations.
//!
//! Both use `std::sync::RwLock`. Vector search is brute-force cosine
//! similarity over every stored vector, which is plenty for a handful of
//! uploaded course documents.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{ChildMatch, IndexEntry, Segment};

use super::{ParentStore, VectorIndex};

fn poisoned<T>(_: T) -> RagError {
    RagError::Store("in-memory store lock poisoned".to_string())
}

/// Vector index kept entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<IndexEntry>>> {
        self.entries.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<IndexEntry>>> {
        self.entries.write().map_err(poisoned)
    }
}

/// Rank entries against `query` and keep the best `k`.
pub fn top_k<'a, I>(query: &[f32], entries: I, k: usize) -> Vec<ChildMatch>
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let mut matches: Vec<ChildMatch> = entries
        .into_iter()
        .map(|e| ChildMatch {
            child_id: e.child_id.clone(),
            parent_id: e.parent_id.clone(),
            score: cosine_similarity(query, &e.vector),
            text: e.text.clone(),
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(k);
    matches
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        self.write()?.extend_from_slice(entries);
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ChildMatch>> {
        let entries = self.read()?;
        Ok(top_k(query, entries.iter(), k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}

/// Parent store backed by a `HashMap`. Contents do not survive the process.
#[derive(Debug, Default)]
pub struct InMemoryParentStore {
    parents: RwLock<HashMap<String, Segment>>,
}

impl InMemoryParentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParentStore for InMemoryParentStore {
    async fn put(&self, parents: &[Segment]) -> Result<()> {
        let mut map = self.parents.write().map_err(poisoned)?;
        for p in parents {
            map.insert(p.id.clone(), p.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Segment>> {
        Ok(self.parents.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.parents.read().map_err(poisoned)?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.parents.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn entry(child: &str, parent: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            child_id: child.to_string(),
            parent_id: parent.to_string(),
            text: format!("text of {}", child),
            metadata: Metadata::new(),
            vector,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .add(&[
                entry("c1", "p1", vec![1.0, 0.0]),
                entry("c2", "p2", vec![0.0, 1.0]),
                entry("c3", "p1", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].child_id, "c1");
        assert_eq!(hits[1].child_id, "c3");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn search_k_larger_than_index() {
        let index = InMemoryVectorIndex::new();
        index.add(&[entry("c1", "p1", vec![1.0])]).await.unwrap();
        let hits = index.search(&[1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(index.search(&[1.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_empties_index() {
        let index = InMemoryVectorIndex::new();
        index.add(&[entry("c1", "p1", vec![1.0])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn parent_store_put_get_clear() {
        let store = InMemoryParentStore::new();
        let parent = Segment {
            id: "p1".into(),
            parent_id: None,
            text: "full parent text".into(),
            metadata: Metadata::new(),
        };
        store.put(std::slice::from_ref(&parent)).await.unwrap();
        assert_eq!(store.get("p1").await.unwrap(), Some(parent));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.count().await.unwrap(), 1);
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
