//! In-memory implementations of [`Registry`] and [`ContentStore`].
//!
//! Same semantics as the persistent backends, no persistence. Used by tests
//! and as the mirror target in reconciliation tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use pregrant_core::{AccessGrant, Completion, ContentId, DataRecord, PrincipalId};

use crate::document::RegistryDocument;
use crate::error::{Result, StoreError};
use crate::traits::{ContentStore, InsertResult, Registry};

/// In-memory registry. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: RwLock<RegistryDocument>,
}

impl MemoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current document.
    pub fn snapshot(&self) -> Result<RegistryDocument> {
        Ok(self.inner.read().map_err(StoreError::poisoned)?.clone())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn put_record(&self, record: &DataRecord) -> Result<InsertResult> {
        self.inner
            .write()
            .map_err(StoreError::poisoned)?
            .put_record(record)
    }

    async fn get_record(&self, content_id: &ContentId) -> Result<Option<DataRecord>> {
        let inner = self.inner.read().map_err(StoreError::poisoned)?;
        Ok(inner.get_record(content_id).cloned())
    }

    async fn list_records(&self) -> Result<Vec<DataRecord>> {
        let inner = self.inner.read().map_err(StoreError::poisoned)?;
        Ok(inner.records.clone())
    }

    async fn put_grant(&self, grant: &AccessGrant) -> Result<()> {
        self.inner
            .write()
            .map_err(StoreError::poisoned)?
            .put_grant(grant)
    }

    async fn get_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
    ) -> Result<Option<AccessGrant>> {
        let inner = self.inner.read().map_err(StoreError::poisoned)?;
        Ok(inner.get_grant(content_id, recipient_id).cloned())
    }

    async fn list_grants(&self, content_id: Option<&ContentId>) -> Result<Vec<AccessGrant>> {
        let inner = self.inner.read().map_err(StoreError::poisoned)?;
        Ok(inner.list_grants(content_id))
    }

    async fn complete_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        transformed_content_id: &ContentId,
    ) -> Result<Completion> {
        self.inner
            .write()
            .map_err(StoreError::poisoned)?
            .complete_grant(content_id, recipient_id, transformed_content_id)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// In-memory content store keyed by BLAKE3 content ids.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<ContentId, Bytes>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let id = ContentId::for_bytes(&bytes);
        self.blobs
            .write()
            .map_err(StoreError::poisoned)?
            .entry(id.clone())
            .or_insert(bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        self.blobs
            .read()
            .map_err(StoreError::poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", id)))
    }
}
