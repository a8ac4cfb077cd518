//! Core data models flowing through ingestion and retrieval.
//!
//! A [`Document`] is one loaded page. The splitter turns it into parent
//! [`Segment`]s and each parent into child segments. Children are embedded
//! into [`IndexEntry`] rows; parents are kept whole in the parent store and
//! returned to the answer generator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key holding the originating file path.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the 0-based page number.
pub const META_PAGE: &str = "page";

/// A metadata value: either text or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Int(n)
    }
}

/// Ordered metadata map attached to documents and segments.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A loaded unit of text (one PDF page) with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A parent or child segment produced by the splitter.
///
/// Parents have `parent_id == None`; every child references the parent it
/// was cut from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub parent_id: Option<String>,
    pub text: String,
    pub metadata: Metadata,
}

impl Segment {
    pub fn is_parent(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The `source` metadata entry, if any.
    pub fn source(&self) -> Option<String> {
        self.metadata.get(META_SOURCE).map(|v| v.to_string())
    }

    /// The `page` metadata entry, if it is an integer.
    pub fn page(&self) -> Option<i64> {
        match self.metadata.get(META_PAGE) {
            Some(MetadataValue::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

/// A child vector stored in the [`VectorIndex`](crate::store::VectorIndex).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub child_id: String,
    pub parent_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// A child returned from nearest-neighbour search.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildMatch {
    pub child_id: String,
    pub parent_id: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
    pub text: String,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Answer plus the parent segments it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub retrieved_context: Vec<Segment>,
}
