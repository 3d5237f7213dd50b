//! Error types for the ledger module.

use pregrant_core::{Blake3Hash, CoreError};
use pregrant_store::StoreError;
use thiserror::Error;

use crate::contract::RevertReason;

/// Errors that can occur talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger node could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The transaction was refused before inclusion; its nonce is not consumed.
    #[error("transaction rejected: {0}")]
    Rejected(RevertReason),

    /// The transaction was included but the contract reverted it.
    #[error("transaction {tx_hash:?} reverted: {reason}")]
    Reverted {
        tx_hash: Blake3Hash,
        reason: RevertReason,
    },

    /// Transaction encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl LedgerError {
    /// The contract-level reason, if the ledger refused the call.
    pub fn reason(&self) -> Option<&RevertReason> {
        match self {
            LedgerError::Rejected(reason) | LedgerError::Reverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<LedgerError> for StoreError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Unavailable(msg) => StoreError::Unavailable(msg),
            LedgerError::Encoding(msg) => StoreError::Serialization(msg),
            LedgerError::Core(core) => StoreError::from(core),
            LedgerError::Rejected(reason) | LedgerError::Reverted { reason, .. } => match reason {
                RevertReason::RecordExists { .. } | RevertReason::GrantExists => {
                    StoreError::Conflict(reason.to_string())
                }
                RevertReason::UnknownRecord | RevertReason::UnknownGrant => {
                    StoreError::NotFound(reason.to_string())
                }
                other => StoreError::InvalidData(other.to_string()),
            },
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
