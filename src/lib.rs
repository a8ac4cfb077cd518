//! # DocuMentor
//!
//! A conversational study assistant over your own PDF documents.
//!
//! PDFs are split into large parent segments and small child segments.
//! Children are embedded and searched; the parents they came from are handed
//! to a chat model together with the conversation so far. Follow-up
//! questions are first rewritten into standalone ones so retrieval works on
//! "what gas does it produce?" as well as on the first question.
//!
//! The retrieval and prompting logic lives in [`documentor_core`]; this
//! crate supplies the concrete pieces around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  loader  │──▶│ documentor_core  │──▶│  sqlite_store /  │
//! │  (PDF)   │   │ split+embed+index│   │  in-memory store │
//! └──────────┘   └────────┬─────────┘   └──────────────────┘
//!                         │
//!                    ┌────┴────┐
//!                    │ session │
//!                    └────┬────┘
//!              ┌──────────┼──────────┐
//!              ▼          ▼          ▼
//!          ┌──────┐   ┌──────┐   ┌──────┐
//!          │ CLI  │   │ REPL │   │ HTTP │
//!          └──────┘   └──────┘   └──────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | PDF directory loading and upload handling |
//! | [`embedding`] | Embedding providers (fastembed, OpenAI, Ollama) |
//! | [`llm`] | Chat model providers (Ollama, OpenAI) |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Persistent vector index and parent store |
//! | [`session`] | Conversation state, ingestion, reset |
//! | [`progress`] | Ingestion progress reporting |
//! | [`logging`] | Tracing subscriber setup |
//! | [`repl`] | Interactive terminal chat |
//! | [`server`] | HTTP API |

pub mod config;
pub mod db;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod repl;
pub mod server;
pub mod session;
pub mod sqlite_store;

pub use documentor_core;
