//! Storage abstractions for the two-tier retriever.
//!
//! - [`VectorIndex`] holds one [`IndexEntry`] per child segment and answers
//!   nearest-neighbour queries.
//! - [`ParentStore`] maps parent ids to full parent [`Segment`]s.
//!
//! The retriever owns the cross-store invariant: every `parent_id` that an
//! index entry references must be present in the parent store.
//!
//! Implementations must be `Send + Sync` to be shared across async tasks.
//! In-memory backends live in [`memory`]; the app crate adds SQLite ones.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChildMatch, IndexEntry, Segment};

/// Child-vector index with similarity search.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Append child entries |
/// | [`search`](VectorIndex::search) | Top-k children by cosine similarity |
/// | [`count`](VectorIndex::count) | Number of stored entries |
/// | [`clear`](VectorIndex::clear) | Drop every entry |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append entries. Duplicate ids are not deduplicated.
    async fn add(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return up to `k` children ordered by descending similarity.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ChildMatch>>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

/// Key-value store of full parent segments.
#[async_trait]
pub trait ParentStore: Send + Sync {
    /// Insert or overwrite parents by id.
    async fn put(&self, parents: &[Segment]) -> Result<()>;

    /// Fetch one parent by id.
    async fn get(&self, id: &str) -> Result<Option<Segment>>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}
