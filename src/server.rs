//! HTTP API around a single [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and readiness) |
//! | `POST` | `/documents` | Upload PDFs (`{files: [{name, content_base64}]}`) and ingest them |
//! | `POST` | `/ingest` | Ingest `documents.dir` or a relative `{dir}` inside it |
//! | `POST` | `/ask` | Answer `{question, history?}` |
//! | `GET`  | `/history` | Session conversation turns |
//! | `POST` | `/reset` | Reset the session |
//!
//! Requests are served one at a time: the session sits behind a
//! `tokio::sync::Mutex`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "no documents have been processed yet" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_ready` (409), `ingestion_failed` (422),
//! `generation_failed` (502), `not_found` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use documentor_core::models::{Segment, Turn};
use documentor_core::retriever::IngestStats;
use documentor_core::RagError;

use crate::loader::Upload;
use crate::session::Session;

type SharedSession = Arc<Mutex<Session>>;

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(session: SharedSession) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_documents))
        .route("/ingest", post(handle_ingest))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history))
        .route("/reset", post(handle_reset))
        .layer(cors)
        .with_state(session)
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(session: Session) -> anyhow::Result<()> {
    let bind_addr = session.config().server.bind.clone();
    let app = router(Arc::new(Mutex::new(session)));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("DocuMentor listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::State(_) => (StatusCode::CONFLICT, "not_ready"),
            RagError::Ingestion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ingestion_failed"),
            RagError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            RagError::NotFound { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "not_found"),
            RagError::Embedding(_) | RagError::Store(_) | RagError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            error!(error = %err, code, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    ready: bool,
}

async fn handle_health(State(session): State<SharedSession>) -> Json<HealthResponse> {
    let ready = session.lock().await.is_ready();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ready,
    })
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadFile {
    name: String,
    content_base64: String,
}

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadFile>,
}

async fn handle_documents(
    State(session): State<SharedSession>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<IngestStats>, AppError> {
    let Json(req) = body?;
    if req.files.is_empty() {
        return Err(bad_request("Please upload at least one PDF file."));
    }

    let mut uploads = Vec::with_capacity(req.files.len());
    for file in req.files {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(file.content_base64.as_bytes())
            .map_err(|e| bad_request(format!("{}: invalid base64: {}", file.name, e)))?;
        uploads.push(Upload {
            name: file.name,
            bytes,
        });
    }

    let stats = session.lock().await.ingest_uploads(&uploads).await?;
    Ok(Json(stats))
}

// ============ POST /ingest ============

#[derive(Deserialize, Default)]
struct IngestRequest {
    #[serde(default)]
    dir: Option<PathBuf>,
}

async fn handle_ingest(
    State(session): State<SharedSession>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestStats>, AppError> {
    let Json(req) = body?;
    let mut session = session.lock().await;
    let dir = match &req.dir {
        Some(dir) => Some(resolve_ingest_dir(&session.config().documents.dir, dir)?),
        None => None,
    };
    let stats = session.ingest_dir(dir.as_deref()).await?;
    Ok(Json(stats))
}

/// Resolve a client-supplied directory under `root`.
///
/// Only relative paths without `..` components are accepted, so clients
/// cannot point the server at arbitrary directories.
fn resolve_ingest_dir(root: &Path, dir: &Path) -> Result<PathBuf, AppError> {
    let confined = dir
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !confined {
        return Err(bad_request(format!(
            "dir must be a relative path inside the documents directory: {}",
            dir.display()
        )));
    }
    Ok(root.join(dir))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    history: Option<Vec<Turn>>,
}

/// A retrieved parent segment as returned to clients.
#[derive(Serialize)]
struct Source {
    source: Option<String>,
    page: Option<i64>,
    text: String,
}

impl From<Segment> for Source {
    fn from(seg: Segment) -> Self {
        Self {
            source: seg.source(),
            page: seg.page(),
            text: seg.text,
        }
    }
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<Source>,
}

async fn handle_ask(
    State(session): State<SharedSession>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = body?;
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let mut session = session.lock().await;
    let response = match &req.history {
        Some(history) => session.ask_with_history(history, question).await?,
        None => session.ask(question).await?,
    };

    Ok(Json(AskResponse {
        answer: response.answer,
        sources: response
            .retrieved_context
            .into_iter()
            .map(Source::from)
            .collect(),
    }))
}

// ============ GET /history ============

#[derive(Serialize)]
struct HistoryResponse {
    turns: Vec<Turn>,
}

async fn handle_history(State(session): State<SharedSession>) -> Json<HistoryResponse> {
    let turns = session.lock().await.history().to_vec();
    Json(HistoryResponse { turns })
}

// ============ POST /reset ============

async fn handle_reset(
    State(session): State<SharedSession>,
) -> Result<Json<serde_json::Value>, AppError> {
    session
        .lock()
        .await
        .reset()
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_dir_stays_under_documents_root() {
        let root = Path::new("/srv/documents");
        assert_eq!(
            resolve_ingest_dir(root, Path::new("week2/lectures")).ok(),
            Some(PathBuf::from("/srv/documents/week2/lectures"))
        );
        assert!(resolve_ingest_dir(root, Path::new("./week2")).is_ok());
        assert!(resolve_ingest_dir(root, Path::new("/etc")).is_err());
        assert!(resolve_ingest_dir(root, Path::new("../secrets")).is_err());
        assert!(resolve_ingest_dir(root, Path::new("week2/../../x")).is_err());
    }
}
