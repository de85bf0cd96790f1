//! Error types for the adaptive cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// == Cache Error Enum ==
/// Unified error type for the cache, the worker unit and the admin API.
///
/// Producer failures are not represented here: the controller hands them back
/// to its caller as the `anyhow::Error` the producer returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Key not found in the store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A value could not be turned into its canonical string
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A canonical string could not be turned back into a value
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Compression or decompression failed
    #[error("Compression failed: {0}")]
    Compression(String),

    /// The worker unit received a tag it does not handle
    #[error("Unknown operation type: {0}")]
    UnknownOperation(String),

    /// No response arrived for a worker request within the bound
    #[error("Worker request {id} timed out after {timeout_ms}ms")]
    WorkerTimeout { id: Uuid, timeout_ms: u64 },

    /// The worker unit is gone or its channel is closed
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The worker unit answered with an error response
    #[error("{0}")]
    Worker(String),

    /// Snapshot file I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::UnknownOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Serialization(_)
            | CacheError::Deserialization(_)
            | CacheError::Compression(_)
            | CacheError::Worker(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::WorkerTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CacheError::WorkerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Io(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
