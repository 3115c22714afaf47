//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. These never
//! cross the gateway/query boundary: the resilience layer absorbs them.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (e.g., lock poisoning, task join failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid data in database (e.g., out-of-range timestamp).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Backend reported itself unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
