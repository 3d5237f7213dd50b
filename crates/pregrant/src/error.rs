//! Error types for the engine.
//!
//! Every backend and crypto failure is translated into one of these kinds
//! before it leaves the crate.

use pregrant_core::{ContentId, GrantKey, PrincipalId};
use pregrant_pre::PreError;
use pregrant_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Registry or content store unreachable or failing.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Duplicate record or grant key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Record, grant, blob or key lookup miss.
    #[error("not found: {0}")]
    NotFound(String),

    /// The grant's key fragments are missing or unreadable.
    #[error("fragments unavailable for {key:?}: {reason}")]
    FragmentUnavailable { key: GrantKey, reason: String },

    /// The ciphertext blob could not be fetched.
    #[error("fetch of {content_id} failed: {reason}")]
    FetchFailed { content_id: ContentId, reason: String },

    /// A stored blob does not parse; a producer wrote garbage.
    #[error("blob {content_id} corrupt: {reason}")]
    BlobCorrupt { content_id: ContentId, reason: String },

    /// The capsule transform refused its inputs.
    #[error("transform failed for {key:?}: {reason}")]
    TransformFailed { key: GrantKey, reason: String },

    /// Two different transformed ids were committed for one grant.
    #[error(
        "double processing of ({content_id}, {recipient_id}): registry holds {existing}, produced {attempted}"
    )]
    DoubleProcessing {
        content_id: ContentId,
        recipient_id: PrincipalId,
        existing: ContentId,
        attempted: ContentId,
    },

    /// The recipient asked before the proxy ran.
    #[error("grant ({content_id}, {recipient_id}) not yet transformed")]
    NotTransformed {
        content_id: ContentId,
        recipient_id: PrincipalId,
    },

    /// A fetched blob does not match the recorded content hash.
    #[error("content {0} does not match its recorded hash")]
    IntegrityMismatch(ContentId),

    /// A request or stored entity failed validation.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Key material could not be created, read or matched.
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] PreError),

    /// Bad configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Worth one more attempt right away.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::BackendUnavailable(_))
    }

    /// Will not heal by retrying; hold the grant for an operator.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            EngineError::BlobCorrupt { .. }
                | EngineError::TransformFailed { .. }
                | EngineError::DoubleProcessing { .. }
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => EngineError::BackendUnavailable(msg),
            StoreError::Database(e) => EngineError::BackendUnavailable(e.to_string()),
            StoreError::Io(e) => EngineError::BackendUnavailable(e.to_string()),
            StoreError::Migration(msg) => EngineError::BackendUnavailable(msg),
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::NotFound(msg) => EngineError::NotFound(msg),
            StoreError::AlreadyTransformed {
                content_id,
                recipient_id,
                existing,
                attempted,
            } => EngineError::DoubleProcessing {
                content_id,
                recipient_id,
                existing,
                attempted,
            },
            StoreError::InvalidData(msg) | StoreError::Serialization(msg) => {
                EngineError::Invalid(msg)
            }
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
