//! Error types for the store module.

use pregrant_core::{ContentId, CoreError, PrincipalId};
use thiserror::Error;

/// Errors that can occur during registry and content store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record, grant or blob not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate key with different content.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A completion named a different transformed id than the one recorded.
    #[error(
        "grant ({content_id}, {recipient_id}) already transformed to {existing}, refusing {attempted}"
    )]
    AlreadyTransformed {
        content_id: ContentId,
        recipient_id: PrincipalId,
        existing: ContentId,
        attempted: ContentId,
    },

    /// Invalid data in storage or in a request.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The backend could not be reached or did not answer.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Error for a blocking task that panicked or was cancelled.
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        StoreError::Unavailable(format!("blocking task failed: {}", e))
    }

    /// Error for a poisoned in-process lock.
    pub(crate) fn poisoned<T>(e: std::sync::PoisonError<T>) -> Self {
        StoreError::Unavailable(format!("lock poisoned: {}", e))
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidGrant(msg) => StoreError::InvalidData(msg),
            CoreError::MalformedBlob(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => StoreError::Serialization(msg),
            other => StoreError::InvalidData(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
