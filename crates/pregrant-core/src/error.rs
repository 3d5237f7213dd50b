//! Error types for pregrant Core.

use thiserror::Error;

use crate::types::ContentId;

/// Core errors that can occur while manipulating records, grants and blobs.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("grant already transformed to {existing}, refusing {attempted}")]
    DivergentCompletion {
        existing: ContentId,
        attempted: ContentId,
    },

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Structural validation errors for records and grants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("grant is Transformed but has no transformed_content_id")]
    TransformedWithoutId,

    #[error("grant is Issued but carries transformed_content_id {0}")]
    IssuedWithId(ContentId),

    #[error("fragment reference {0} is not a valid locator")]
    BadFragmentReference(String),

    #[error("recipient public key is not valid hex")]
    BadRecipientKey,
}

impl From<ValidationError> for CoreError {
    fn from(e: ValidationError) -> Self {
        CoreError::InvalidGrant(e.to_string())
    }
}
