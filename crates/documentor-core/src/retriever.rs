//! Two-tier parent/child retriever.
//!
//! Small child segments are embedded and searched; the larger parent
//! segments they were cut from are what callers get back. Small children
//! give precise similarity matches while parents give the answer generator
//! enough surrounding context.
//!
//! # Ingestion
//!
//! ```text
//! Document ──parent splitter──▶ parents ──child splitter──▶ children
//!                                  │                            │
//!                                  ▼                            ▼ embed
//!                            ParentStore                   VectorIndex
//! ```
//!
//! Parents are written before their children's index entries so that every
//! `parent_id` in the index resolves.
//!
//! # Retrieval
//!
//! 1. Embed the query with the ingestion embedder.
//! 2. Fetch the `k` nearest children.
//! 3. Map children to parent ids, keeping the first occurrence of each.
//! 4. Resolve each parent id; a missing parent is [`RagError::NotFound`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunk::RecursiveSplitter;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Document, IndexEntry, Segment};
use crate::store::{ParentStore, VectorIndex};

/// Number of children fetched per query when no `k` is given.
pub const DEFAULT_K: usize = 4;

/// Counts reported by [`HierarchicalRetriever::ingest`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestStats {
    pub documents: usize,
    pub parents: usize,
    pub children: usize,
    /// Parents that produced no children and are unreachable by search.
    pub childless_parents: usize,
}

/// Splits, embeds, and indexes documents; answers queries with parents.
pub struct HierarchicalRetriever {
    parent_splitter: RecursiveSplitter,
    child_splitter: RecursiveSplitter,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    parents: Arc<dyn ParentStore>,
    k: usize,
}

impl HierarchicalRetriever {
    pub fn new(
        parent_splitter: RecursiveSplitter,
        child_splitter: RecursiveSplitter,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        parents: Arc<dyn ParentStore>,
    ) -> Self {
        Self {
            parent_splitter,
            child_splitter,
            embedder,
            index,
            parents,
            k: DEFAULT_K,
        }
    }

    /// Override the number of children searched per query. Zero is treated as one.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Split, embed, and store `documents`.
    ///
    /// Not idempotent: ingesting the same document twice stores it twice.
    /// Stops at the first failing document; documents already stored stay
    /// stored.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        for doc in documents {
            let (parents, children) = self.split_document(doc);

            self.parents.put(&parents).await?;

            let childless = parents
                .iter()
                .filter(|p| !children.iter().any(|c| c.parent_id.as_ref() == Some(&p.id)))
                .count();

            if !children.is_empty() {
                let entries = self.embed_children(children).await?;
                self.index.add(&entries).await?;
                stats.children += entries.len();
            }

            stats.documents += 1;
            stats.parents += parents.len();
            stats.childless_parents += childless;
        }

        if stats.childless_parents > 0 {
            warn!(
                childless_parents = stats.childless_parents,
                "some parent segments produced no children and cannot be retrieved"
            );
        }
        info!(
            documents = stats.documents,
            parents = stats.parents,
            children = stats.children,
            "ingestion complete"
        );
        Ok(stats)
    }

    /// Cut one document into parents and children. Every document yields at
    /// least one parent.
    fn split_document(&self, doc: &Document) -> (Vec<Segment>, Vec<Segment>) {
        let mut parent_texts = self.parent_splitter.split_text(&doc.text);
        if parent_texts.is_empty() {
            parent_texts.push(String::new());
        }

        let mut parents = Vec::with_capacity(parent_texts.len());
        let mut children = Vec::new();

        for text in parent_texts {
            let parent = Segment {
                id: Uuid::new_v4().to_string(),
                parent_id: None,
                text,
                metadata: doc.metadata.clone(),
            };

            for child_text in self.child_splitter.split_text(&parent.text) {
                children.push(Segment {
                    id: Uuid::new_v4().to_string(),
                    parent_id: Some(parent.id.clone()),
                    text: child_text,
                    metadata: doc.metadata.clone(),
                });
            }
            parents.push(parent);
        }

        (parents, children)
    }

    async fn embed_children(&self, children: Vec<Segment>) -> Result<Vec<IndexEntry>> {
        let texts: Vec<String> = children.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| RagError::Ingestion(format!("embedding failed: {}", e)))?;

        if vectors.len() != children.len() {
            return Err(RagError::Ingestion(format!(
                "embedder returned {} vectors for {} segments",
                vectors.len(),
                children.len()
            )));
        }

        Ok(children
            .into_iter()
            .zip(vectors)
            .filter_map(|(child, vector)| {
                child.parent_id.map(|parent_id| IndexEntry {
                    child_id: child.id,
                    parent_id,
                    text: child.text,
                    metadata: child.metadata,
                    vector,
                })
            })
            .collect())
    }

    /// Parents relevant to `query`, using the configured `k`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Segment>> {
        self.retrieve_k(query, self.k).await
    }

    /// Parents relevant to `query`, searching the `k` nearest children.
    ///
    /// The result holds at most `k` parents, ordered by the rank of their
    /// best-matching child.
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<Segment>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let matches = self.index.search(&query_vec, k).await?;

        let mut seen = HashSet::new();
        let parent_ids: Vec<String> = matches
            .into_iter()
            .filter(|m| seen.insert(m.parent_id.clone()))
            .map(|m| m.parent_id)
            .collect();

        debug!(k, parents = parent_ids.len(), "resolved child matches");

        let mut results = Vec::with_capacity(parent_ids.len());
        for parent_id in parent_ids {
            match self.parents.get(&parent_id).await? {
                Some(parent) => results.push(parent),
                None => {
                    error!(parent_id = %parent_id, "index entry references a missing parent");
                    return Err(RagError::NotFound { parent_id });
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{META_PAGE, META_SOURCE};
    use crate::store::memory::{InMemoryParentStore, InMemoryVectorIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-words embedder: each lowercase word hashes into one of 64 buckets.
    struct WordEmbedder {
        calls: AtomicUsize,
    }

    impl WordEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    fn bucket(word: &str) -> usize {
        word.bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
            % 64
    }

    #[async_trait]
    impl Embedder for WordEmbedder {
        fn model_name(&self) -> &str {
            "words"
        }
        fn dims(&self) -> usize {
            64
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 64];
                    for w in t.split(|c: char| !c.is_alphanumeric()) {
                        if !w.is_empty() {
                            v[bucket(&w.to_lowercase())] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("model offline".into()))
        }
    }

    fn retriever_with(
        embedder: Arc<dyn Embedder>,
        parent_size: usize,
        child_size: usize,
    ) -> (
        HierarchicalRetriever,
        Arc<InMemoryVectorIndex>,
        Arc<InMemoryParentStore>,
    ) {
        let index = Arc::new(InMemoryVectorIndex::new());
        let parents = Arc::new(InMemoryParentStore::new());
        let retriever = HierarchicalRetriever::new(
            RecursiveSplitter::new(parent_size, 0).unwrap(),
            RecursiveSplitter::new(child_size, 0).unwrap(),
            embedder,
            index.clone(),
            parents.clone(),
        );
        (retriever, index, parents)
    }

    fn econ_doc() -> Document {
        Document::new(
            "Opportunity cost is the value of the next best alternative forgone.\n\n\
             Photosynthesis converts light into chemical energy in plants.\n\n\
             Supply and demand determine market prices.",
        )
        .with_metadata(META_SOURCE, "econ.pdf")
        .with_metadata(META_PAGE, 0i64)
    }

    #[tokio::test]
    async fn children_reference_their_parents() {
        let embedder = Arc::new(WordEmbedder::new());
        let (retriever, index, parents) = retriever_with(embedder.clone(), 80, 30);

        let stats = retriever.ingest(&[econ_doc()]).await.unwrap();
        assert_eq!(stats.documents, 1);
        assert!(stats.parents >= 2);
        assert!(stats.children >= stats.parents);
        assert_eq!(stats.childless_parents, 0);
        assert_eq!(parents.count().await.unwrap(), stats.parents);
        assert_eq!(index.count().await.unwrap(), stats.children);
        // One embedding call per document.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        // Every child's parent exists.
        let hits = index.search(&[1.0; 64], 100).await.unwrap();
        for hit in hits {
            let parent = parents.get(&hit.parent_id).await.unwrap().unwrap();
            assert!(parent.is_parent());
            assert!(parent.text.contains(hit.text.split_whitespace().next().unwrap()));
        }
    }

    #[tokio::test]
    async fn retrieve_returns_relevant_parent_with_metadata() {
        let (retriever, _, _) = retriever_with(Arc::new(WordEmbedder::new()), 80, 30);
        retriever.ingest(&[econ_doc()]).await.unwrap();

        let results = retriever.retrieve("what is opportunity cost").await.unwrap();
        assert!(!results.is_empty());
        assert!(results[0].text.contains("Opportunity cost"));
        assert_eq!(results[0].source().as_deref(), Some("econ.pdf"));
        assert_eq!(results[0].page(), Some(0));
    }

    #[tokio::test]
    async fn retrieve_deduplicates_parents() {
        // Large parents, tiny children: several children share one parent.
        let (retriever, _, parents) = retriever_with(Arc::new(WordEmbedder::new()), 2000, 20);
        retriever.ingest(&[econ_doc()]).await.unwrap();
        assert_eq!(parents.count().await.unwrap(), 1);

        let results = retriever.retrieve_k("opportunity cost value", 4).await.unwrap();
        assert_eq!(results.len(), 1);

        let ids: HashSet<_> = results.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), results.len());
    }

    #[tokio::test]
    async fn retrieve_on_empty_index_is_empty() {
        let (retriever, _, _) = retriever_with(Arc::new(WordEmbedder::new()), 80, 30);
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_parent_is_not_found() {
        let (retriever, _, parents) = retriever_with(Arc::new(WordEmbedder::new()), 80, 30);
        retriever.ingest(&[econ_doc()]).await.unwrap();
        parents.clear().await.unwrap();

        let err = retriever.retrieve("opportunity cost").await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }

    #[tokio::test]
    async fn blank_document_yields_one_childless_parent() {
        let (retriever, index, parents) = retriever_with(Arc::new(WordEmbedder::new()), 80, 30);
        let stats = retriever
            .ingest(&[Document::new("   \n\n  ")])
            .await
            .unwrap();
        assert_eq!(stats.parents, 1);
        assert_eq!(stats.children, 0);
        assert_eq!(stats.childless_parents, 1);
        assert_eq!(parents.count().await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reingest_duplicates_entries() {
        let (retriever, index, _) = retriever_with(Arc::new(WordEmbedder::new()), 80, 30);
        let first = retriever.ingest(&[econ_doc()]).await.unwrap();
        retriever.ingest(&[econ_doc()]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), first.children * 2);
    }

    #[tokio::test]
    async fn embedding_failure_is_ingestion_error() {
        let (retriever, index, _) = retriever_with(Arc::new(BrokenEmbedder), 80, 30);
        let err = retriever.ingest(&[econ_doc()]).await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[test]
    fn with_k_clamps_zero() {
        let (retriever, _, _) = retriever_with(Arc::new(WordEmbedder::new()), 80, 30);
        assert_eq!(retriever.k(), DEFAULT_K);
        assert_eq!(retriever.with_k(0).k(), 1);
    }
}
