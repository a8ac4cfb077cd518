//! Conversation session: stores, pipeline, and history in one value.
//!
//! A [`Session`] starts in the not-ready state. A successful ingestion
//! builds fresh stores, indexes the documents, and wires a
//! [`ConversationalPipeline`]; from then on questions can be answered.
//! [`Session::reset`] drops everything (history, stores, the persisted
//! index directory, and uploaded files) and returns to the not-ready state.
//!
//! Each ingestion replaces the previous index. Uploads accumulate in
//! `documents.upload_dir`, so re-processing after another upload indexes
//! every file uploaded so far.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

use documentor_core::chunk::RecursiveSplitter;
use documentor_core::embedding::Embedder;
use documentor_core::llm::ChatModel;
use documentor_core::models::{Document, RagResponse, Turn};
use documentor_core::pipeline::ConversationalPipeline;
use documentor_core::retriever::{HierarchicalRetriever, IngestStats};
use documentor_core::store::memory::{InMemoryParentStore, InMemoryVectorIndex};
use documentor_core::store::{ParentStore, VectorIndex};
use documentor_core::{RagError, Result};

use crate::config::Config;
use crate::loader::{self, Upload};
use crate::progress::{IngestPhase, NoProgress, ProgressReporter};
use crate::sqlite_store::{self, SqliteParentStore, SqliteVectorIndex};
use crate::{db, embedding, llm};

/// First assistant message shown in a new conversation.
pub const GREETING: &str = "Hello! Upload some documents and I'll be ready to help you study.";
/// Reply when a question arrives before any documents were processed.
pub const NOT_READY_MESSAGE: &str = "Please process some documents first before asking questions.";
/// Reply when answering fails for any other reason.
pub const ERROR_MESSAGE: &str = "Sorry, I encountered an error.";

pub struct Session {
    config: Config,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    pool: Option<SqlitePool>,
    pipeline: Option<Arc<ConversationalPipeline>>,
    history: Vec<Turn>,
    progress: Box<dyn ProgressReporter>,
}

impl Session {
    /// Build providers from `config` and open the session.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let chat = llm::create_chat_model(&config.llm)?;
        Self::with_components(config, embedder, chat).await
    }

    /// Open a session with explicit embedding and chat providers.
    ///
    /// When `storage.persist_dir` is set the SQLite index is opened, and a
    /// previously persisted index is restored if its ingestion finished and
    /// its parents were persisted too. Anything else is discarded.
    pub async fn with_components(
        config: Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> anyhow::Result<Self> {
        let mut session = Self {
            config,
            embedder,
            chat,
            pool: None,
            pipeline: None,
            history: Vec::new(),
            progress: Box::new(NoProgress),
        };
        session.open_storage().await?;
        session.restore().await?;
        Ok(session)
    }

    pub fn set_progress(&mut self, progress: Box<dyn ProgressReporter>) {
        self.progress = progress;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    async fn open_storage(&mut self) -> anyhow::Result<()> {
        let Some(pool) = db::open_index(&self.config.storage).await? else {
            return Ok(());
        };
        if self.embedder.dims() > 0 {
            sqlite_store::ensure_embedding_model(
                &pool,
                self.embedder.model_name(),
                self.embedder.dims(),
            )
            .await?;
        }
        self.pool = Some(pool);
        Ok(())
    }

    async fn restore(&mut self) -> anyhow::Result<()> {
        let Some(pool) = self.pool.clone() else {
            return Ok(());
        };

        let index = SqliteVectorIndex::new(pool.clone());
        let children = index.count().await?;
        if children == 0 {
            return Ok(());
        }

        let parents = SqliteParentStore::new(pool.clone());
        if !sqlite_store::is_ingest_complete(&pool).await? {
            warn!(children, "persisted index is from an unfinished ingestion, discarding it");
            sqlite_store::clear_all(&pool).await?;
        } else if self.config.storage.persist_parents && parents.count().await? > 0 {
            let pipeline = self.build_pipeline(Arc::new(index), Arc::new(parents))?;
            self.pipeline = Some(Arc::new(pipeline));
            info!(children, "restored persisted index");
        } else {
            warn!(
                children,
                "persisted index has no matching parent store, discarding it"
            );
            sqlite_store::clear_all(&pool).await?;
        }
        Ok(())
    }

    /// Empty stores for a new ingestion run.
    async fn fresh_stores(&self) -> Result<(Arc<dyn VectorIndex>, Arc<dyn ParentStore>)> {
        let index: Arc<dyn VectorIndex> = match &self.pool {
            Some(pool) => Arc::new(SqliteVectorIndex::new(pool.clone())),
            None => Arc::new(InMemoryVectorIndex::new()),
        };
        let parents: Arc<dyn ParentStore> = match &self.pool {
            Some(pool) if self.config.storage.persist_parents => {
                Arc::new(SqliteParentStore::new(pool.clone()))
            }
            _ => Arc::new(InMemoryParentStore::new()),
        };
        index.clear().await?;
        parents.clear().await?;
        Ok((index, parents))
    }

    fn build_retriever(
        &self,
        index: Arc<dyn VectorIndex>,
        parents: Arc<dyn ParentStore>,
    ) -> Result<HierarchicalRetriever> {
        let s = &self.config.splitter;
        let parent_splitter = RecursiveSplitter::new(s.parent_chunk_size, s.parent_chunk_overlap)?;
        let child_splitter = RecursiveSplitter::new(s.child_chunk_size, s.child_chunk_overlap)?;
        Ok(HierarchicalRetriever::new(
            parent_splitter,
            child_splitter,
            self.embedder.clone(),
            index,
            parents,
        )
        .with_k(self.config.retrieval.k))
    }

    fn build_pipeline(
        &self,
        index: Arc<dyn VectorIndex>,
        parents: Arc<dyn ParentStore>,
    ) -> Result<ConversationalPipeline> {
        let retriever = self.build_retriever(index, parents)?;
        Ok(ConversationalPipeline::with_model(
            Arc::new(retriever),
            self.chat.clone(),
        ))
    }

    /// Load and index every PDF under `dir` (default `documents.dir`).
    pub async fn ingest_dir(&mut self, dir: Option<&Path>) -> Result<IngestStats> {
        let dir: PathBuf = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.documents.dir.clone());

        self.progress.report(IngestPhase::Loading);
        let docs_config = self.config.documents.clone();
        let documents =
            tokio::task::spawn_blocking(move || loader::load_directory(&dir, &docs_config))
                .await
                .map_err(|e| RagError::Ingestion(format!("loader task failed: {}", e)))??;

        self.ingest_documents(documents).await
    }

    /// Save an upload batch into `documents.upload_dir` and index that directory.
    pub async fn ingest_uploads(&mut self, uploads: &[Upload]) -> Result<IngestStats> {
        if uploads.is_empty() {
            return Err(RagError::Ingestion(
                "Please upload at least one PDF file.".to_string(),
            ));
        }
        let upload_dir = self.config.documents.upload_dir.clone();
        loader::save_uploads(&upload_dir, uploads)?;
        self.ingest_dir(Some(&upload_dir)).await
    }

    /// Index already-loaded documents, replacing any previous index.
    ///
    /// The session is not ready afterwards if ingestion fails, and a
    /// partially written persisted index is discarded.
    pub async fn ingest_documents(&mut self, documents: Vec<Document>) -> Result<IngestStats> {
        if documents.is_empty() {
            return Err(RagError::Ingestion("no documents to ingest".to_string()));
        }

        self.pipeline = None;
        self.progress.report(IngestPhase::Structuring);
        let (index, parents) = self.fresh_stores().await?;
        let retriever = self.build_retriever(index, parents)?;

        if let Some(pool) = &self.pool {
            sqlite_store::set_ingest_complete(pool, false).await?;
        }

        self.progress.report(IngestPhase::Building);
        let stats = match retriever.ingest(&documents).await {
            Ok(stats) => stats,
            Err(e) => {
                if let Some(pool) = &self.pool {
                    if let Err(clear_err) = sqlite_store::clear_all(pool).await {
                        error!(error = %clear_err, "failed to discard partial index");
                    }
                }
                return Err(e);
            }
        };
        if let Some(pool) = &self.pool {
            sqlite_store::set_ingest_complete(pool, true).await?;
        }

        self.progress.report(IngestPhase::CreatingAssistant);
        self.pipeline = Some(Arc::new(ConversationalPipeline::with_model(
            Arc::new(retriever),
            self.chat.clone(),
        )));

        self.progress.report(IngestPhase::Ready);
        Ok(stats)
    }

    fn pipeline(&self) -> Result<Arc<ConversationalPipeline>> {
        self.pipeline.clone().ok_or_else(|| {
            RagError::State("no documents have been processed yet".to_string())
        })
    }

    /// Answer with the session history, then append the exchange to it.
    ///
    /// History is only extended when an answer was produced.
    pub async fn ask(&mut self, question: &str) -> Result<RagResponse> {
        let pipeline = self.pipeline()?;
        let response = pipeline.ask(&self.history, question).await?;
        self.history.push(Turn::user(question));
        self.history.push(Turn::assistant(response.answer.clone()));
        Ok(response)
    }

    /// Answer against a caller-supplied history without touching the session's.
    pub async fn ask_with_history(&self, history: &[Turn], question: &str) -> Result<RagResponse> {
        self.pipeline()?.ask(history, question).await
    }

    /// Like [`ask`](Self::ask) but always returns text for display.
    pub async fn respond(&mut self, question: &str) -> String {
        match self.ask(question).await {
            Ok(response) => response.answer,
            Err(RagError::State(_)) => NOT_READY_MESSAGE.to_string(),
            Err(e) => {
                error!(error = %e, "failed to answer question");
                ERROR_MESSAGE.to_string()
            }
        }
    }

    /// Forget everything: history, both stores, the persisted index
    /// directory, and the upload directory.
    pub async fn reset(&mut self) -> anyhow::Result<()> {
        self.history.clear();
        self.pipeline = None;

        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        discard_files(&self.config)?;

        self.open_storage().await?;
        info!("session reset");
        Ok(())
    }
}

/// Delete the persisted index directory and the upload directory.
pub fn discard_files(config: &Config) -> anyhow::Result<()> {
    if let Some(dir) = &config.storage.persist_dir {
        remove_dir_if_exists(dir)?;
    }
    remove_dir_if_exists(&config.documents.upload_dir)
}

fn remove_dir_if_exists(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    Ok(())
}
