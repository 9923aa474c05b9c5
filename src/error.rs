//! Error types for the cache engine and the recovery executor
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::recovery::ErrorKind;

// == Cache Error Enum ==
/// Error type for cache operations and the introspection API.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bad pattern or options; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CacheError::Configuration(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CacheError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CacheError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            CacheError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// == Recovery Error Enum ==
/// Terminal failure surfaced by the recovery executor.
///
/// The operation's own error is carried unchanged in `Operation`.
#[derive(Error, Debug)]
pub enum RecoveryError<E> {
    /// The breaker for this operation is open; the operation was not run
    #[error("Circuit breaker is open for operation: {operation_id}")]
    CircuitOpen { operation_id: String },

    /// The attempt lost the race against its deadline
    #[error("Operation timeout after {0:?}")]
    Timeout(Duration),

    /// The operation failed with its own error
    #[error("Operation failed: {0}")]
    Operation(E),

    /// Invalid executor options
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl<E> RecoveryError<E> {
    /// Classification of this failure, if it has one.
    ///
    /// Synthetic circuit and configuration errors are not classified.
    pub fn kind(&self) -> Option<ErrorKind>
    where
        E: crate::recovery::Classify,
    {
        match self {
            RecoveryError::CircuitOpen { .. } | RecoveryError::Configuration(_) => None,
            RecoveryError::Timeout(_) => Some(ErrorKind::Timeout),
            RecoveryError::Operation(err) => Some(crate::recovery::classify(err)),
        }
    }

    /// Returns the operation's own error, if that is what failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RecoveryError::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RecoveryError::CircuitOpen { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
