//! The registry document: records and grants in insertion order.
//!
//! This is both the on-disk shape of the local registry
//! (`{"records": [...], "grants": [...]}`) and the state behind the
//! in-memory registry, so the two backends share one set of rules.

use pregrant_core::{
    validate_grant, validate_record, AccessGrant, Completion, ContentId, CoreError, DataRecord,
    PrincipalId,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::traits::InsertResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub records: Vec<DataRecord>,
    pub grants: Vec<AccessGrant>,
}

impl RegistryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every entity and the uniqueness of keys.
    pub fn validate(&self) -> Result<()> {
        for (i, record) in self.records.iter().enumerate() {
            validate_record(record).map_err(|e| StoreError::InvalidData(e.to_string()))?;
            if self.records[..i]
                .iter()
                .any(|r| r.content_id == record.content_id)
            {
                return Err(StoreError::InvalidData(format!(
                    "duplicate record {}",
                    record.content_id
                )));
            }
        }
        for (i, grant) in self.grants.iter().enumerate() {
            validate_grant(grant).map_err(|e| StoreError::InvalidData(e.to_string()))?;
            if self.grants[..i]
                .iter()
                .any(|g| g.content_id == grant.content_id && g.recipient_id == grant.recipient_id)
            {
                return Err(StoreError::InvalidData(format!(
                    "duplicate grant ({}, {})",
                    grant.content_id, grant.recipient_id
                )));
            }
        }
        Ok(())
    }

    pub fn get_record(&self, content_id: &ContentId) -> Option<&DataRecord> {
        self.records.iter().find(|r| &r.content_id == content_id)
    }

    pub fn put_record(&mut self, record: &DataRecord) -> Result<InsertResult> {
        validate_record(record).map_err(|e| StoreError::InvalidData(e.to_string()))?;

        if let Some(existing) = self.get_record(&record.content_id) {
            if existing.content_hash == record.content_hash {
                return Ok(InsertResult::AlreadyExists);
            }
            return Err(StoreError::Conflict(format!(
                "record {} already exists with hash {}",
                record.content_id, existing.content_hash
            )));
        }

        self.records.push(record.clone());
        Ok(InsertResult::Inserted)
    }

    pub fn get_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
    ) -> Option<&AccessGrant> {
        self.grants
            .iter()
            .find(|g| &g.content_id == content_id && &g.recipient_id == recipient_id)
    }

    pub fn put_grant(&mut self, grant: &AccessGrant) -> Result<()> {
        validate_grant(grant).map_err(|e| StoreError::InvalidData(e.to_string()))?;

        if self.get_grant(&grant.content_id, &grant.recipient_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "grant ({}, {}) already exists",
                grant.content_id, grant.recipient_id
            )));
        }

        self.grants.push(grant.clone());
        Ok(())
    }

    pub fn list_grants(&self, content_id: Option<&ContentId>) -> Vec<AccessGrant> {
        self.grants
            .iter()
            .filter(|g| content_id.map_or(true, |id| &g.content_id == id))
            .cloned()
            .collect()
    }

    /// Apply the completion transition to the stored grant in place.
    pub fn complete_grant(
        &mut self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        transformed_content_id: &ContentId,
    ) -> Result<Completion> {
        let grant = self
            .grants
            .iter_mut()
            .find(|g| &g.content_id == content_id && &g.recipient_id == recipient_id)
            .ok_or_else(|| {
                StoreError::NotFound(format!("grant ({}, {})", content_id, recipient_id))
            })?;

        grant
            .complete(transformed_content_id.clone())
            .map_err(|e| completion_error(content_id, recipient_id, e))
    }
}

/// Translate a core completion error into the store taxonomy.
pub(crate) fn completion_error(
    content_id: &ContentId,
    recipient_id: &PrincipalId,
    e: CoreError,
) -> StoreError {
    match e {
        CoreError::DivergentCompletion { existing, attempted } => StoreError::AlreadyTransformed {
            content_id: content_id.clone(),
            recipient_id: recipient_id.clone(),
            existing,
            attempted,
        },
        other => other.into(),
    }
}
