//! Error types for the ingestion engine
//!
//! All engine errors are `Clone` so a single in-flight sync outcome can be
//! handed to every caller waiting on it.

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

/// Failure of the fetch collaborator (network, timeout, HTTP status)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("Response too large: {:.1}MB (limit {limit_mb}MB)", as_mb(.size_bytes))]
    TooLarge { size_bytes: u64, limit_mb: usize },
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

fn as_mb(bytes: &u64) -> f64 {
    *bytes as f64 / 1024.0 / 1024.0
}

/// Content-level failure; never retried automatically
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed document: {0}")]
    Malformed(String),
    #[error("Invalid encoding: {0}")]
    Encoding(String),
}

/// Failure reported by a store backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Error returned by every public engine operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Playlist already subscribed: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("Store failed: {0}")]
    Store(#[from] StoreError),
    #[error("Sync cancelled")]
    Cancelled,
}

impl IngestError {
    fn status_code(&self) -> StatusCode {
        match self {
            IngestError::NotFound(_) => StatusCode::NOT_FOUND,
            IngestError::Conflict(_) | IngestError::Cancelled => StatusCode::CONFLICT,
            IngestError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            IngestError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::Fetch(_) => StatusCode::BAD_GATEWAY,
            IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                "Request failed: {}",
                crate::services::xtream::redact_password(&self.to_string())
            );
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
