//! Error taxonomy shared by every DocuMentor component.

use thiserror::Error;

/// Errors raised while ingesting documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// No documents found, an unreadable file, a splitter misconfiguration,
    /// or an embedding failure while indexing.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// A matched child points at a parent that is missing from the parent
    /// store. This is an integrity violation between the two stores.
    #[error("parent segment not found: {parent_id}")]
    NotFound {
        /// The dangling parent id.
        parent_id: String,
    },

    /// The language model was unreachable, timed out, or returned
    /// malformed output.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A question was asked before any ingestion completed.
    #[error("not ready: {0}")]
    State(String),

    /// The embedding function failed outside of ingestion (query time).
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A storage backend failed.
    #[error("store error: {0}")]
    Store(String),

    /// A component was constructed with invalid settings.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result alias for core operations.
pub type Result<T> = std::result::Result<T, RagError>;
