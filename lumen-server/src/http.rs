//! Lumen HTTP REST API
//!
//! Axum-based HTTP server exposing the analysis pipeline: classify an image,
//! persist the result with comments, list/fetch/delete saved records, and
//! compute time-windowed dashboard summaries.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /health               — health check with DB status
//! - GET    /version              — server version info
//! - POST   /analyze              — classify an uploaded image (multipart)
//! - POST   /records              — save image + analysis + comments (multipart)
//! - GET    /records              — all saved records, newest first
//! - GET    /records/:id          — one saved record
//! - DELETE /records/:id          — remove a record and its image blob
//! - POST   /records/:id/comments — append one comment
//! - GET    /dashboard/summary    — windowed statistics over saved records

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lumen_core::store::StorageError;
use lumen_core::{
    summarize, AnalysisResult, ClassificationError, ClassificationGateway, Comment, RecordStore,
    Window,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Shared state for all HTTP handlers. Gateway and store are constructed at
/// startup and injected here — no process-wide singletons.
pub struct HttpState {
    pub pool: PgPool,
    pub gateway: ClassificationGateway,
    pub store: RecordStore,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/analyze", post(analyze_handler))
        .route("/records", post(create_record_handler).get(list_records_handler))
        .route(
            "/records/:id",
            get(get_record_handler).delete(delete_record_handler),
        )
        .route("/records/:id/comments", post(append_comment_handler))
        .route("/dashboard/summary", get(summary_handler))
        .with_state(state)
}

/// Start the HTTP server on the given address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    addr: &str,
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Lumen HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Parsed fields of the multipart record-save request.
#[derive(Debug, Default)]
pub struct RecordUpload {
    /// Image bytes and their MIME type.
    pub image: Option<(Vec<u8>, String)>,
    /// `analysisResult` field — JSON text.
    pub analysis_result: Option<String>,
    /// `comments` field — JSON text, optional.
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendCommentRequest {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SummaryParams {
    pub window: Option<String>,
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    let msg = msg.into();
    json!({ "error": msg, "status": "error" })
}

/// Map a blob MIME type to the stored file extension.
pub fn ext_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn classification_error_response(e: ClassificationError) -> (StatusCode, serde_json::Value) {
    let kind = match &e {
        ClassificationError::Unreachable(_) => "unreachable",
        ClassificationError::Rejected { .. } => "rejected",
        ClassificationError::MalformedResponse(_) => "malformed-response",
    };
    tracing::error!(kind = kind, error = %e, "classification failed");
    (
        StatusCode::BAD_GATEWAY,
        json!({ "error": e.to_string(), "kind": kind, "status": "error" }),
    )
}

fn storage_error_response(e: StorageError) -> (StatusCode, serde_json::Value) {
    match e {
        StorageError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            error_body(format!("record not found: {id}")),
        ),
        other => {
            tracing::error!(error = %other, "storage operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(other.to_string()))
        }
    }
}

fn record_json(record: &lumen_core::SavedRecord) -> serde_json::Value {
    serde_json::to_value(record).unwrap_or_else(|_| json!({}))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries DB and returns (status_code, json_body).
pub async fn health_inner(
    pool: &PgPool,
    classifier_backend: &str,
) -> (StatusCode, serde_json::Value) {
    let pg_ver = match lumen_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    (
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
            "classifier": classifier_backend,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "lumen/1",
    })
}

/// Inner analyze — forwards the uploaded image to the classification gateway.
pub async fn analyze_inner(
    gateway: &ClassificationGateway,
    image: Option<(Vec<u8>, String)>,
) -> (StatusCode, serde_json::Value) {
    let (bytes, mime) = match image {
        Some((bytes, mime)) if !bytes.is_empty() => (bytes, mime),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("image field is required"),
            );
        }
    };

    match gateway.analyze(&bytes, &mime).await {
        Ok(result) => (
            StatusCode::OK,
            serde_json::to_value(&result).unwrap_or_else(|_| json!({})),
        ),
        Err(e) => classification_error_response(e),
    }
}

/// Inner record create — validates the upload, stores blob + record.
pub async fn create_record_inner(
    store: &RecordStore,
    upload: RecordUpload,
) -> (StatusCode, serde_json::Value) {
    let (bytes, mime) = match upload.image {
        Some((bytes, mime)) if !bytes.is_empty() => (bytes, mime),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("image field is required"),
            );
        }
    };

    let raw_result = match upload.analysis_result {
        Some(r) => r,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("analysisResult field is required"),
            );
        }
    };

    let analysis_result: AnalysisResult = match serde_json::from_str(&raw_result) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_body(format!("invalid analysisResult: {e}")),
            );
        }
    };
    if let Err(e) = analysis_result.validate() {
        return (
            StatusCode::BAD_REQUEST,
            error_body(format!("invalid analysisResult: {e}")),
        );
    }

    let comments: Vec<Comment> = match upload.comments {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    error_body(format!("invalid comments: {e}")),
                );
            }
        },
        None => vec![],
    };
    if comments.iter().any(|c| c.text.trim().is_empty()) {
        return (
            StatusCode::BAD_REQUEST,
            error_body("comment text must not be empty"),
        );
    }

    match store
        .create(&bytes, ext_for_mime(&mime), analysis_result, comments)
        .await
    {
        Ok(record) => (StatusCode::CREATED, record_json(&record)),
        Err(e) => storage_error_response(e),
    }
}

/// Inner list — all saved records, newest first.
pub async fn list_records_inner(store: &RecordStore) -> (StatusCode, serde_json::Value) {
    match store.list().await {
        Ok(records) => (
            StatusCode::OK,
            serde_json::to_value(&records).unwrap_or_else(|_| json!([])),
        ),
        Err(e) => storage_error_response(e),
    }
}

/// Inner get — one saved record by id.
pub async fn get_record_inner(store: &RecordStore, id: Uuid) -> (StatusCode, serde_json::Value) {
    match store.get(id).await {
        Ok(record) => (StatusCode::OK, record_json(&record)),
        Err(e) => storage_error_response(e),
    }
}

/// Inner delete — removes the record and its blob.
pub async fn delete_record_inner(
    store: &RecordStore,
    id: Uuid,
) -> (StatusCode, serde_json::Value) {
    match store.delete(id).await {
        Ok(()) => (
            StatusCode::OK,
            json!({ "message": "record deleted", "id": id }),
        ),
        Err(e) => storage_error_response(e),
    }
}

/// Inner comment append — explicit single-comment mutation.
pub async fn append_comment_inner(
    store: &RecordStore,
    id: Uuid,
    req: AppendCommentRequest,
) -> (StatusCode, serde_json::Value) {
    let comment = match req.text.as_deref().map(Comment::new) {
        Some(Ok(c)) => c,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("text field is required"),
            );
        }
    };

    match store.append_comment(id, comment).await {
        Ok(record) => (StatusCode::OK, record_json(&record)),
        Err(e) => storage_error_response(e),
    }
}

/// Inner summary — resolves the window, reads the store, aggregates.
pub async fn summary_inner(
    store: &RecordStore,
    params: SummaryParams,
) -> (StatusCode, serde_json::Value) {
    let window: Window = match params.window.as_deref().unwrap_or("lifetime").parse() {
        Ok(w) => w,
        Err(e) => return (StatusCode::BAD_REQUEST, error_body(e.to_string())),
    };

    let records = match store.list().await {
        Ok(r) => r,
        Err(e) => return storage_error_response(e),
    };

    let summary = summarize(&records, window);
    (
        StatusCode::OK,
        serde_json::to_value(&summary).unwrap_or_else(|_| json!({})),
    )
}

// ============================================================================
// Multipart parsing
// ============================================================================

/// Drain a multipart stream into the record-upload fields. Unknown fields
/// are ignored.
pub async fn collect_record_upload(mut multipart: Multipart) -> Result<RecordUpload, String> {
    let mut upload = RecordUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                upload.image = Some((bytes.to_vec(), mime));
            }
            Some("analysisResult") => {
                upload.analysis_result = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            Some("comments") => {
                upload.comments = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            _ => {}
        }
    }

    Ok(upload)
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool, state.gateway.backend_name()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    multipart: Multipart,
) -> impl IntoResponse {
    let upload = match collect_record_upload(multipart).await {
        Ok(u) => u,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_body(format!("invalid multipart payload: {e}"))),
            );
        }
    };
    let (status, body) = analyze_inner(&state.gateway, upload.image).await;
    (status, Json(body))
}

pub async fn create_record_handler(
    State(state): State<Arc<HttpState>>,
    multipart: Multipart,
) -> impl IntoResponse {
    let upload = match collect_record_upload(multipart).await {
        Ok(u) => u,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_body(format!("invalid multipart payload: {e}"))),
            );
        }
    };
    let (status, body) = create_record_inner(&state.store, upload).await;
    (status, Json(body))
}

pub async fn list_records_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = list_records_inner(&state.store).await;
    (status, Json(body))
}

pub async fn get_record_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = get_record_inner(&state.store, id).await;
    (status, Json(body))
}

pub async fn delete_record_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = delete_record_inner(&state.store, id).await;
    (status, Json(body))
}

pub async fn append_comment_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AppendCommentRequest>,
) -> impl IntoResponse {
    let (status, body) = append_comment_inner(&state.store, id, req).await;
    (status, Json(body))
}

pub async fn summary_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<SummaryParams>,
) -> impl IntoResponse {
    let (status, body) = summary_inner(&state.store, params).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — inner functions and pure helpers
// ============================================================================
