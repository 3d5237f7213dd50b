//! Error types for the re-encryption capability.

use thiserror::Error;

/// Errors raised by [`crate::PreScheme`] operations.
#[derive(Debug, Error)]
pub enum PreError {
    /// A key was malformed or not a valid group element.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A capsule failed to parse or its self-check failed.
    #[error("invalid capsule: {0}")]
    InvalidCapsule(String),

    /// A key fragment's owner signature did not verify.
    #[error("key fragment verification failed: {0}")]
    FragmentVerification(String),

    #[error("invalid threshold {threshold} of {shares} shares")]
    InvalidThreshold { threshold: usize, shares: usize },

    #[error("insufficient capsule fragments: need at least {needed}, got {got}")]
    InsufficientFragments { needed: usize, got: usize },

    /// Capsule fragments do not belong to one delegation.
    #[error("mismatched capsule fragments: {0}")]
    MismatchedFragments(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for re-encryption operations.
pub type Result<T> = std::result::Result<T, PreError>;
