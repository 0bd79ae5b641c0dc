//! HTTP surface for the document QA service.
//!
//! - `POST /ask` – Answer `{ question, document_id? }` from the indexed documents.
//! - `POST /upload` – Multipart upload (field `file`) of a `.pdf` or `.txt` document, followed
//!   by a full rebuild of the knowledge base.
//! - `GET /documents` – List stored documents with size and modification time.
//! - `GET /health` – Liveness plus whether a knowledge base is loaded.
//! - `GET /` – Service banner.
//!
//! CORS is fully permissive and request bodies are capped at the configured upload size; a larger
//! upload is answered with 413. Malformed `/ask` bodies still get the `{ response, success }`
//! shape.

use crate::knowledge::{DocumentInfo, DocumentKind, KnowledgeBaseError};
use crate::rag::RagApi;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartError, rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const UNSUPPORTED_UPLOAD_MESSAGE: &str = "Only PDF and TXT files are allowed";

/// Build the HTTP router over `service`.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<S>))
        .route("/ask", post(ask::<S>))
        .route("/upload", post(upload::<S>))
        .route("/documents", get(list_documents::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Document QA backend is running",
        "status": "online"
    }))
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: RagApi,
{
    Json(json!({
        "status": "healthy",
        "knowledge_base_ready": service.is_ready()
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
    /// Restrict retrieval to one stored document.
    #[serde(default)]
    document_id: Option<String>,
}

/// Response body for `POST /ask`.
#[derive(Serialize)]
struct AskResponse {
    response: String,
    success: bool,
}

fn ask_reply(
    status: StatusCode,
    response: String,
    success: bool,
) -> (StatusCode, Json<AskResponse>) {
    (status, Json(AskResponse { response, success }))
}

async fn ask<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> (StatusCode, Json<AskResponse>)
where
    S: RagApi,
{
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Rejected malformed ask body");
            return ask_reply(rejection.status(), rejection.body_text(), false);
        }
    };

    let question = request.question.trim();
    if question.is_empty() {
        return ask_reply(
            StatusCode::BAD_REQUEST,
            "Question must not be empty".to_string(),
            false,
        );
    }

    let outcome = service
        .answer(question, request.document_id.as_deref())
        .await;
    tracing::info!(success = outcome.success(), "Ask request completed");
    ask_reply(StatusCode::OK, outcome.message(), outcome.success())
}

/// Response body for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

impl UploadResponse {
    fn rejected(status: StatusCode, message: impl Into<String>) -> Response {
        (
            status,
            Json(Self {
                message: message.into(),
                success: false,
                filename: None,
            }),
        )
            .into_response()
    }
}

async fn upload<S>(State(service): State<Arc<S>>, multipart: Multipart) -> Response
where
    S: RagApi,
{
    let (filename, bytes) = match read_file_field(multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            return UploadResponse::rejected(StatusCode::BAD_REQUEST, "No file provided");
        }
        Err(error) if error.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::warn!(error = %error, "Upload exceeds the body limit");
            return UploadResponse::rejected(
                StatusCode::PAYLOAD_TOO_LARGE,
                "File exceeds the upload size limit",
            );
        }
        Err(error) => {
            tracing::warn!(error = %error, "Malformed multipart upload");
            return UploadResponse::rejected(
                StatusCode::BAD_REQUEST,
                format!("Invalid upload: {error}"),
            );
        }
    };

    if DocumentKind::from_filename(&filename).is_none() {
        tracing::warn!(filename = %filename, "Rejected upload with unsupported extension");
        return UploadResponse::rejected(StatusCode::BAD_REQUEST, UNSUPPORTED_UPLOAD_MESSAGE);
    }

    tracing::info!(filename = %filename, bytes = bytes.len(), "Processing uploaded document");
    match service.upload(bytes, &filename).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(UploadResponse {
                message: format!("Successfully processed {}", outcome.filename),
                success: true,
                filename: Some(outcome.filename),
            }),
        )
            .into_response(),
        Err(
            error @ (KnowledgeBaseError::UnsupportedFileType(_)
            | KnowledgeBaseError::InvalidFilename(_)),
        ) => UploadResponse::rejected(StatusCode::BAD_REQUEST, error.to_string()),
        Err(error) => {
            tracing::error!(filename = %filename, error = %error, "Upload processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UploadResponse {
                    message: format!("Failed to process {filename}"),
                    success: false,
                    filename: Some(filename),
                }),
            )
                .into_response()
        }
    }
}

/// Pull the first `file` field out of the multipart body.
async fn read_file_field(
    mut multipart: Multipart,
) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(Some((filename, bytes.to_vec())));
    }
    Ok(None)
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentInfo>,
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: RagApi,
{
    let documents = service.list_documents().await?;
    Ok(Json(DocumentsResponse { documents }))
}

struct AppError(KnowledgeBaseError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": self.0.to_string(), "success": false })),
        )
            .into_response()
    }
}

impl From<KnowledgeBaseError> for AppError {
    fn from(inner: KnowledgeBaseError) -> Self {
        Self(inner)
    }
}
