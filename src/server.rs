//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Retrieve + generate for `{text}` |
//! | `POST` | `/api/retrieve` | Scored chunks for `{query, filter?, rerank?}` |
//! | `POST` | `/api/generate` | Retrieve + generate with model/prompt overrides |
//! | `POST` | `/api/connections/{id}/sync` | Trigger a connection sync |
//! | `POST` | `/api/documents` | Multipart upload (`file`, `metadata?`, `mode?`) |
//! | `GET`  | `/api/documents/{id}` | Document status |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "Ragie API error 503: retrieval backend unavailable" }
//! ```
//!
//! A request whose body does not have the expected shape is answered with
//! `422` before any upstream call. Every other failure is a `500` whose
//! `detail` is the error message; upstream 4xx and 5xx are not told apart.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::compose::Composer;
use crate::config::{Config, Credentials};
use crate::documents::DocumentClient;
use crate::error::{RelayError, Result};
use crate::models::{
    DocumentMetadata, DocumentStatus, DocumentUpload, DocumentUploadResponse, GenerationRequest,
    GenerationResponse, Query, RetrievalRequest, RetrievalResponse, SyncResponse,
};
use crate::traits::DocumentStore;

/// Shared state handed to every handler. Collaborators are injected here
/// rather than held in globals.
#[derive(Clone)]
pub struct AppState {
    composer: Arc<Composer>,
    documents: Arc<dyn DocumentStore>,
    upload_mode: String,
    upload_dir: Option<PathBuf>,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(composer: Composer, documents: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            composer: Arc::new(composer),
            documents,
            upload_mode: config.retrieval.upload_mode.clone(),
            upload_dir: config.server.upload_dir.clone(),
            max_body_bytes: config.server.max_body_bytes(),
        }
    }

    /// State backed by the hosted Ragie and OpenAI services.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Self {
        let documents = DocumentClient::new(&config.retrieval, credentials.ragie_api_key.clone());
        Self::new(
            Composer::from_config(config, credentials),
            Arc::new(documents),
            config,
        )
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/query", post(handle_query))
        .route("/api/retrieve", post(handle_retrieve))
        .route("/api/generate", post(handle_generate))
        .route("/api/connections/{id}/sync", post(handle_sync))
        .route("/api/documents", post(handle_upload))
        .route("/api/documents/{id}", get(handle_document_status))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the server against the hosted services.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config, credentials: &Credentials) -> anyhow::Result<()> {
    run_server_with_state(config, AppState::from_config(config, credentials)).await
}

/// Like [`run_server`], but with caller-supplied collaborators.
pub async fn run_server_with_state(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn validation(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Validation(msg) => Self::validation(msg),
            other => {
                warn!(error = %other, "request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: other.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Retrieval and generation ============

async fn handle_query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Query>, JsonRejection>,
) -> std::result::Result<Json<GenerationResponse>, AppError> {
    let Json(query) = payload?;
    Ok(Json(state.composer.query(&query.text).await?))
}

async fn handle_retrieve(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RetrievalRequest>, JsonRejection>,
) -> std::result::Result<Json<RetrievalResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(state.composer.retrieve(&request).await?))
}

async fn handle_generate(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> std::result::Result<Json<GenerationResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(state.composer.generate(&request).await?))
}

// ============ Documents and connections ============

async fn handle_sync(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> std::result::Result<Json<SyncResponse>, AppError> {
    Ok(Json(state.documents.sync(&connection_id).await?))
}

async fn handle_document_status(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> std::result::Result<Json<DocumentStatus>, AppError> {
    Ok(Json(state.documents.status(&document_id).await?))
}

/// Handler for `POST /api/documents`.
///
/// The `file` part is buffered into a temporary file, which is removed as
/// soon as the upstream call returns, whatever its outcome.
async fn handle_upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<DocumentUploadResponse>, AppError> {
    let mut multipart = multipart?;

    let mut buffered: Option<BufferedFile> = None;
    let mut metadata: Option<DocumentMetadata> = None;
    let mut mode: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => buffered = Some(buffer_field(field, state.upload_dir.as_ref()).await?),
            "metadata" => metadata = parse_metadata(&field_text(field).await?)?,
            "mode" => {
                let value = field_text(field).await?;
                if !value.trim().is_empty() {
                    mode = Some(value.trim().to_string());
                }
            }
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let buffered = buffered
        .ok_or_else(|| RelayError::Validation("missing multipart field: file".to_string()))?;

    let upload = DocumentUpload {
        path: buffered.temp.path().to_path_buf(),
        file_name: buffered.file_name,
        content_type: buffered.content_type,
        metadata,
        mode: mode.unwrap_or_else(|| state.upload_mode.clone()),
    };

    let result = state.documents.upload(&upload).await;
    drop(buffered.temp);
    debug!(path = %upload.path.display(), "removed buffered upload");

    Ok(Json(result?))
}

struct BufferedFile {
    temp: NamedTempFile,
    file_name: String,
    content_type: Option<String>,
}

async fn buffer_field(mut field: Field<'_>, dir: Option<&PathBuf>) -> Result<BufferedFile> {
    let file_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field.content_type().map(str::to_string);

    let temp = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new()?,
    };
    let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);

    let mut written = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| RelayError::Validation(e.body_text()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;

    debug!(path = %temp.path().display(), bytes = written, file = %file_name, "buffered upload");

    Ok(BufferedFile {
        temp,
        file_name,
        content_type,
    })
}

async fn field_text(field: Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| RelayError::Validation(e.body_text()))
}

/// `metadata` arrives as a JSON string; blank means "none".
fn parse_metadata(raw: &str) -> Result<Option<DocumentMetadata>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| RelayError::Validation(format!("metadata must be a JSON object: {}", e)))
}
