//! # DocuMentor Core
//!
//! The orchestration layer of DocuMentor: data models, the recursive
//! parent/child splitter, embedding and chat-model traits, the vector index
//! and parent store abstractions, the hierarchical retriever, and the
//! conversational RAG pipeline built from them.
//!
//! This crate performs no filesystem or network I/O. PDF loading, concrete
//! embedding and chat providers, and SQLite persistence live in the
//! `documentor` app crate and plug in through the traits defined here.
//!
//! ## Query flow
//!
//! ```text
//! history + question
//!        │
//!        ▼
//! ┌──────────────┐   standalone   ┌──────────────┐   parents   ┌──────────────┐
//! │ QueryRewriter│───────────────▶│ Hierarchical │────────────▶│AnswerGenerator│
//! └──────────────┘    question    │  Retriever   │             └──────┬───────┘
//!                                 └──────────────┘                    │
//!                                                                     ▼
//!                                                              RagResponse
//! ```

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod rewrite;
pub mod store;

pub use error::{RagError, Result};
