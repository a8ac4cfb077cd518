//! TOML configuration for the `documentor` application.
//!
//! Every section has defaults, so an empty file (or no file at all, see
//! [`load_or_default`]) yields a working setup: local MiniLM embeddings,
//! `llama3` on a local Ollama, and an index persisted to `./vector_db`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            upload_dir: default_upload_dir(),
            include_globs: default_include_globs(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("./temp_docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitterConfig {
    #[serde(default = "default_parent_chunk_size")]
    pub parent_chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub parent_chunk_overlap: usize,
    #[serde(default = "default_child_chunk_size")]
    pub child_chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub child_chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            parent_chunk_size: default_parent_chunk_size(),
            parent_chunk_overlap: default_overlap(),
            child_chunk_size: default_child_chunk_size(),
            child_chunk_overlap: default_overlap(),
        }
    }
}

fn default_parent_chunk_size() -> usize {
    2000
}
fn default_child_chunk_size() -> usize {
    400
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    documentor_core::retriever::DEFAULT_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("all-minilm-l6-v2".to_string())
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: default_ollama_url(),
            timeout_secs: default_llm_timeout_secs(),
            temperature: None,
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3".to_string()
}
pub(crate) fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_persist_dir")]
    pub persist_dir: Option<PathBuf>,
    #[serde(default)]
    pub persist_parents: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist_dir: default_persist_dir(),
            persist_parents: false,
        }
    }
}

fn default_persist_dir() -> Option<PathBuf> {
    Some(PathBuf::from("./vector_db"))
}

impl StorageConfig {
    /// Path of the SQLite index inside the persist directory.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.persist_dir.as_ref().map(|d| d.join("index.sqlite"))
    }

    /// Whether an index built now can be restored by a later process.
    pub fn survives_restart(&self) -> bool {
        self.persist_dir.is_some() && self.persist_parents
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` if it exists, otherwise fall back to [`Config::default`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        info!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate splitter
    let s = &config.splitter;
    if s.parent_chunk_size == 0 || s.child_chunk_size == 0 {
        anyhow::bail!("splitter chunk sizes must be > 0");
    }
    if s.parent_chunk_overlap >= s.parent_chunk_size {
        anyhow::bail!("splitter.parent_chunk_overlap must be < parent_chunk_size");
    }
    if s.child_chunk_overlap >= s.child_chunk_size {
        anyhow::bail!("splitter.child_chunk_overlap must be < child_chunk_size");
    }
    if s.child_chunk_size > s.parent_chunk_size {
        anyhow::bail!("splitter.child_chunk_size must be <= parent_chunk_size");
    }

    // Validate retrieval
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if let Some(t) = config.llm.temperature {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.splitter.parent_chunk_size, 2000);
        assert_eq!(config.splitter.child_chunk_size, 400);
        assert_eq!(config.splitter.child_chunk_overlap, 200);
        assert_eq!(config.retrieval.k, 4);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.documents.upload_dir, PathBuf::from("./temp_docs"));
        assert_eq!(
            config.storage.db_path(),
            Some(PathBuf::from("./vector_db/index.sqlite"))
        );
        assert!(!config.storage.persist_parents);
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [retrieval]
            k = 6

            [llm]
            provider = "openai"
            model = "gpt-4o-mini"
            temperature = 0.1

            [storage]
            persist_dir = "/tmp/idx"
            persist_parents = true
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k, 6);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.temperature, Some(0.1));
        assert!(config.storage.persist_parents);
        assert_eq!(config.splitter.parent_chunk_size, 2000);
    }

    #[test]
    fn rejects_bad_overlap() {
        let err = parse_config("[splitter]\nchild_chunk_size = 100\nchild_chunk_overlap = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("child_chunk_overlap"));
    }

    #[test]
    fn rejects_child_larger_than_parent() {
        assert!(parse_config(
            "[splitter]\nparent_chunk_size = 300\nparent_chunk_overlap = 0\nchild_chunk_size = 400\nchild_chunk_overlap = 0\n"
        )
        .is_err());
    }

    #[test]
    fn rejects_unknown_providers() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[llm]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn remote_embedding_needs_dims() {
        assert!(parse_config("[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n"
        )
        .is_ok());
    }

    #[test]
    fn zero_k_rejected() {
        assert!(parse_config("[retrieval]\nk = 0\n").is_err());
    }

    #[test]
    fn index_survives_restart_only_with_persisted_parents() {
        let mut storage = StorageConfig::default();
        assert!(!storage.survives_restart());
        storage.persist_parents = true;
        assert!(storage.survives_restart());
        storage.persist_dir = None;
        assert!(!storage.survives_restart());
    }

    #[test]
    fn example_config_parses() {
        let config = parse_config(include_str!("../config/documentor.example.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8501");
        assert_eq!(config.documents.include_globs, vec!["**/*.pdf".to_string()]);
    }
}
