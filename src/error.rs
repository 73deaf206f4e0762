//! Error taxonomy for the OCR pipeline.
//!
//! Three tiers, mirrored by the HTTP layer:
//! - [`ValidationError`]: the request is rejected before any processing
//!   starts (HTTP 400, no temp resources created).
//! - [`PipelineError`]: a single file or page failed; recorded in that
//!   item's result and never escalated past it.
//! - [`ApiError`]: what handlers return; wraps validation failures and
//!   unexpected system errors (HTTP 500, generic body, full detail logged).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No file provided. Use 'file' or 'image' field.")]
    MissingFile,
    #[error("No file selected")]
    EmptyFilename,
    #[error("File too large. Max size: {max} bytes")]
    FileTooLarge { max: u64 },
    #[error("Unsupported format: {ext}. Supported: {supported}")]
    UnsupportedFormat { ext: String, supported: String },
    #[error("Invalid value for '{field}': {value}")]
    InvalidParameter { field: String, value: String },
    #[error("No files provided")]
    NoFilesInBatch,
    #[error("Malformed multipart body: {0}")]
    Multipart(String),
}

/// Failure of a single file or page inside the pipeline. Callers fold the
/// message into the affected item's result and keep going.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("processed image could not be written: {0}")]
    Encode(String),
    #[error("engine invocation failed: {0}")]
    Engine(String),
    #[error("engine timed out after {0} seconds")]
    EngineTimeout(u64),
    #[error("page rasterization failed: {0}")]
    Rasterize(String),
    #[error("unreadable pdf: {0}")]
    PdfParse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handler-level error. Responses are always structured JSON, never a raw
/// stack trace.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Internal(anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
