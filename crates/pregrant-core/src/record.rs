//! Data records and access grants.
//!
//! A [`DataRecord`] is immutable once created. An [`AccessGrant`] is created
//! `Issued` and moves to `Transformed` exactly once; the only mutation path is
//! [`AccessGrant::complete`], which every registry backend routes through so
//! that the state and the transformed id always change together.

use serde::{Deserialize, Serialize};

use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::types::{ContentId, FragmentRef, GrantId, GrantKey, PrincipalId};

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Provenance of one encrypted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    pub content_id: ContentId,
    /// BLAKE3 of the ciphertext blob stored at `content_id`.
    pub content_hash: Blake3Hash,
    pub owner_id: PrincipalId,
    /// Application-level label, e.g. a sensor name.
    pub logical_source_id: String,
    pub created_at: i64,
}

impl DataRecord {
    /// Create a record for a blob that was just stored at `content_id`.
    pub fn new(
        content_id: ContentId,
        blob: &[u8],
        owner_id: PrincipalId,
        logical_source_id: impl Into<String>,
    ) -> Self {
        Self {
            content_id,
            content_hash: Blake3Hash::hash(blob),
            owner_id,
            logical_source_id: logical_source_id.into(),
            created_at: now_millis(),
        }
    }

    /// Check a freshly fetched blob against the recorded commitment.
    pub fn verify_content(&self, blob: &[u8]) -> bool {
        self.content_hash.matches(blob)
    }
}

/// Lifecycle state of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Issued,
    /// Terminal.
    Transformed,
}

/// Outcome of a successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The grant moved `Issued -> Transformed`.
    Completed,
    /// The grant was already `Transformed` with the same id; nothing changed.
    AlreadyCompleted,
}

/// A delegation from an owner to one recipient for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub content_id: ContentId,
    pub owner_id: PrincipalId,
    pub recipient_id: PrincipalId,
    /// Hex-encoded public key of the recipient.
    pub recipient_public_key: String,
    pub fragment_reference: FragmentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_content_id: Option<ContentId>,
    pub state: GrantState,
    pub created_at: i64,
}

impl AccessGrant {
    /// Issue a new grant.
    pub fn issue(
        content_id: ContentId,
        owner_id: PrincipalId,
        recipient_id: PrincipalId,
        recipient_public_key: impl Into<String>,
        fragment_reference: FragmentRef,
    ) -> Self {
        Self {
            content_id,
            owner_id,
            recipient_id,
            recipient_public_key: recipient_public_key.into(),
            fragment_reference,
            transformed_content_id: None,
            state: GrantState::Issued,
            created_at: now_millis(),
        }
    }

    /// The `(content_id, recipient_id)` key.
    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.content_id.clone(), self.recipient_id.clone())
    }

    /// The derived grant identifier.
    pub fn grant_id(&self) -> GrantId {
        self.key().grant_id()
    }

    pub fn is_transformed(&self) -> bool {
        self.state == GrantState::Transformed
    }

    /// Apply the `Issued -> Transformed` transition.
    ///
    /// Both fields change together or not at all. Re-applying with the same
    /// id is a no-op; a different id is a [`CoreError::DivergentCompletion`].
    pub fn complete(&mut self, transformed_content_id: ContentId) -> Result<Completion, CoreError> {
        if transformed_content_id.is_empty() {
            return Err(CoreError::InvalidGrant(
                "transformed_content_id must not be empty".into(),
            ));
        }

        match (&self.state, &self.transformed_content_id) {
            (GrantState::Transformed, Some(existing)) if *existing == transformed_content_id => {
                Ok(Completion::AlreadyCompleted)
            }
            (GrantState::Transformed, Some(existing)) => Err(CoreError::DivergentCompletion {
                existing: existing.clone(),
                attempted: transformed_content_id,
            }),
            (GrantState::Transformed, None) => Err(CoreError::InvalidGrant(
                "grant is Transformed but has no transformed_content_id".into(),
            )),
            (GrantState::Issued, _) => {
                self.transformed_content_id = Some(transformed_content_id);
                self.state = GrantState::Transformed;
                Ok(Completion::Completed)
            }
        }
    }
}
