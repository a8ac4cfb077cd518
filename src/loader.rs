//! PDF document loader.
//!
//! Walks a directory, keeps files matching `documents.include_globs`, and
//! extracts text page by page with `pdf-extract`. Each page becomes one
//! [`Document`] with `source` (file path) and `page` (0-based) metadata.
//!
//! Files are visited in sorted path order so ingestion is deterministic.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use documentor_core::models::{Document, META_PAGE, META_SOURCE};
use documentor_core::{RagError, Result};

use crate::config::DocumentsConfig;

/// One uploaded file: the client-side name and its raw bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Load every matching PDF under `dir`.
///
/// Fails with [`RagError::Ingestion`] when the directory is missing, holds
/// no matching files, or a file cannot be read or parsed.
pub fn load_directory(dir: &Path, config: &DocumentsConfig) -> Result<Vec<Document>> {
    let files = find_pdfs(dir, config)?;
    if files.is_empty() {
        return Err(RagError::Ingestion(format!(
            "no PDF documents found in {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for path in &files {
        let pages = load_pdf(path)?;
        debug!(path = %path.display(), pages = pages.len(), "loaded PDF");
        documents.extend(pages);
    }

    info!(files = files.len(), pages = documents.len(), "documents loaded");
    Ok(documents)
}

/// Matching files under `dir`, sorted by path.
pub fn find_pdfs(dir: &Path, config: &DocumentsConfig) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::Ingestion(format!(
            "document directory does not exist: {}",
            dir.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(config.follow_symlinks) {
        let entry = entry.map_err(|e| RagError::Ingestion(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if include_set.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Extract one [`Document`] per page of the PDF at `path`.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::Ingestion(format!("failed to read {}: {}", path.display(), e)))?;
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| {
        RagError::Ingestion(format!("failed to parse {}: {}", path.display(), e))
    })?;

    let source = path.display().to_string();
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| {
            Document::new(text)
                .with_metadata(META_SOURCE, source.as_str())
                .with_metadata(META_PAGE, page as i64)
        })
        .collect())
}

/// Write an upload batch into `dir`, creating it if needed.
///
/// Only the final path component of each name is used. Returns the paths
/// written.
pub fn save_uploads(dir: &Path, uploads: &[Upload]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .map_err(|e| RagError::Ingestion(format!("failed to create {}: {}", dir.display(), e)))?;

    let mut written = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let file_name = Path::new(&upload.name)
            .file_name()
            .ok_or_else(|| RagError::Ingestion(format!("invalid file name: {:?}", upload.name)))?;
        let target = dir.join(file_name);
        std::fs::write(&target, &upload.bytes).map_err(|e| {
            RagError::Ingestion(format!("failed to write {}: {}", target.display(), e))
        })?;
        written.push(target);
    }
    Ok(written)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid glob set: {}", e)))
}
