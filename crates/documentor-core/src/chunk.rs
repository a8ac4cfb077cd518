//! Recursive character text splitter.
//!
//! Splits text into chunks of at most `chunk_size` characters, trying a
//! list of separators in order of preference (`"\n\n"`, `"\n"`, `" "`, and
//! finally single characters). Adjacent pieces are merged back together
//! until the size limit is reached, and consecutive chunks share up to
//! `chunk_overlap` characters of trailing context.
//!
//! The same splitter is used twice by the
//! [`HierarchicalRetriever`](crate::retriever::HierarchicalRetriever): once
//! with a large size to cut parent segments and once with a small size to
//! cut the children that are embedded for search.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text (the empty separator
//!    always matches and splits into characters).
//! 2. Split on it, keeping the separator attached to the start of the
//!    following piece so no text is lost.
//! 3. Pieces shorter than `chunk_size` are buffered; an oversized piece
//!    flushes the buffer and is split again with the remaining separators.
//! 4. Buffered pieces are merged into chunks, sliding a window that keeps at
//!    most `chunk_overlap` characters when a chunk is emitted.
//! 5. Chunks are whitespace-trimmed and empty chunks are dropped.
//!
//! # Example
//!
//! ```rust
//! use documentor_core::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(40, 0).unwrap();
//! let chunks = splitter.split_text("First paragraph.\n\nSecond paragraph is here.");
//! assert_eq!(chunks, vec!["First paragraph.", "Second paragraph is here."]);
//! ```

use std::collections::VecDeque;

use crate::error::{RagError, Result};

/// Separators tried in order, from coarsest to finest.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Character-count based recursive splitter.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter with the default separators.
    ///
    /// Fails when `chunk_size` is zero or `chunk_overlap` is not smaller
    /// than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge_pieces(&small));
                small.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge_pieces(&small));
        }

        chunks
    }

    /// Merge small pieces into chunks no longer than `chunk_size`, carrying
    /// at most `chunk_overlap` characters into the next chunk.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split on `separator`, attaching each separator occurrence to the start of
/// the piece that follows it. The empty separator splits into characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}
