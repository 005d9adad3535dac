//! Error types for the cache backend
//!
//! Provides unified error handling using thiserror. Cache misses are not
//! errors; they surface as `None` from the adapter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Network failure, pool exhaustion or timeout talking to memcached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key required by the operation is absent (incr/decr, version moves)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key violates memcached key rules
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Server refused or failed the command
    #[error("Server error: {0}")]
    Server(String),

    /// Invalid backend configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// True for failures that a fresh connection might fix.
    pub fn is_connection(&self) -> bool {
        matches!(self, CacheError::Connection(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_)
            | CacheError::InvalidRequest(_)
            | CacheError::Serialization(_) => StatusCode::BAD_REQUEST,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Server(_) => StatusCode::BAD_GATEWAY,
            CacheError::Config(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache backend.
pub type Result<T> = std::result::Result<T, CacheError>;
