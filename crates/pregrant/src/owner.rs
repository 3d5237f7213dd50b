//! Owner workflow: produce encrypted records, issue grants, read back.

use std::sync::Arc;

use bytes::Bytes;
use pregrant_core::{
    AccessGrant, ContentId, DataRecord, EncryptedBlob, GrantKey, PrincipalId,
};
use pregrant_pre::{Capsule, PublicKey};
use pregrant_store::{ContentStore, InsertResult, Registry};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::keys::{KeyMaterial, KeyMaterialManager};

/// An owner bound to its key material and the shared backends.
pub struct Owner {
    material: KeyMaterial,
    registry: Arc<dyn Registry>,
    content: Arc<dyn ContentStore>,
    keys: Arc<KeyMaterialManager>,
    threshold: usize,
    shares: usize,
}

impl Owner {
    pub(crate) fn new(
        material: KeyMaterial,
        registry: Arc<dyn Registry>,
        content: Arc<dyn ContentStore>,
        keys: Arc<KeyMaterialManager>,
        threshold: usize,
        shares: usize,
    ) -> Self {
        Self {
            material,
            registry,
            content,
            keys,
            threshold,
            shares,
        }
    }

    pub fn id(&self) -> &PrincipalId {
        self.material.identity()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.material.public_key()
    }

    /// Encrypt `payload` under the owner's key, upload it and record it.
    pub async fn produce(
        &self,
        payload: &[u8],
        logical_source_id: &str,
    ) -> Result<DataRecord> {
        let scheme = self.keys.scheme();
        let (capsule, ciphertext) = scheme.encrypt(self.material.public_key(), payload)?;
        let blob = EncryptedBlob {
            logical_source_id: logical_source_id.to_string(),
            ciphertext,
            capsule: capsule.to_bytes().to_vec(),
        }
        .to_json_bytes()
        .map_err(|e| EngineError::Invalid(e.to_string()))?;

        let content_id = self.content.put(Bytes::from(blob.clone())).await?;
        let record = DataRecord::new(
            content_id,
            &blob,
            self.id().clone(),
            logical_source_id,
        );

        match self.registry.put_record(&record).await? {
            InsertResult::Inserted => {
                info!(content_id = %record.content_id, source = logical_source_id, "data record produced");
                Ok(record)
            }
            // identical bytes were produced before; hand back what was recorded first
            InsertResult::AlreadyExists => self
                .registry
                .get_record(&record.content_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("record {}", record.content_id))),
        }
    }

    /// Grant `recipient_id` access to `content_id`, looking up the
    /// recipient's published public key.
    pub async fn grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
    ) -> Result<AccessGrant> {
        let recipient_pk = self.keys.public_key_of(recipient_id).await?;
        self.grant_with_key(content_id, recipient_id, &recipient_pk)
            .await
    }

    /// Grant access to a recipient whose public key is supplied directly.
    pub async fn grant_with_key(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        recipient_pk: &PublicKey,
    ) -> Result<AccessGrant> {
        if recipient_id.is_empty() {
            return Err(EngineError::Invalid("recipient_id must not be empty".into()));
        }

        let record = self
            .registry
            .get_record(content_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("record {}", content_id)))?;
        if record.owner_id != *self.id() {
            return Err(EngineError::Invalid(format!(
                "record {} belongs to {}, not {}",
                content_id,
                record.owner_id,
                self.id()
            )));
        }

        if self
            .registry
            .get_grant(content_id, recipient_id)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "grant ({}, {}) already issued",
                content_id, recipient_id
            )));
        }

        let key = GrantKey::new(content_id.clone(), recipient_id.clone());
        let fragments =
            self.keys
                .derive_fragments(&self.material, recipient_pk, self.threshold, self.shares)?;
        let reference = self.keys.persist_fragments(&fragments, &key).await?;

        let grant = AccessGrant::issue(
            content_id.clone(),
            self.id().clone(),
            recipient_id.clone(),
            recipient_pk.to_hex(),
            reference,
        );
        self.registry.put_grant(&grant).await?;

        info!(
            content_id = %content_id,
            recipient_id = %recipient_id,
            grant_id = %grant.grant_id(),
            shares = fragments.len(),
            "access granted"
        );
        Ok(grant)
    }

    /// Re-fetch a record's blob and check it against the recorded hash.
    pub async fn verify_record(&self, content_id: &ContentId) -> Result<DataRecord> {
        let (record, _) = self.fetch_verified(content_id).await?;
        Ok(record)
    }

    /// Decrypt one of the owner's own records.
    pub async fn decrypt_own(&self, content_id: &ContentId) -> Result<Vec<u8>> {
        let (record, blob) = self.fetch_verified(content_id).await?;
        if record.owner_id != *self.id() {
            return Err(EngineError::Invalid(format!(
                "record {} belongs to {}",
                content_id, record.owner_id
            )));
        }

        let corrupt = |reason: String| EngineError::BlobCorrupt {
            content_id: content_id.clone(),
            reason,
        };
        let blob = EncryptedBlob::from_json_bytes(&blob).map_err(|e| corrupt(e.to_string()))?;
        let capsule = Capsule::from_bytes(&blob.capsule).map_err(|e| corrupt(e.to_string()))?;

        Ok(self.keys.scheme().decrypt_original(
            self.material.secret_key(),
            &capsule,
            &blob.ciphertext,
        )?)
    }

    /// All records in registry order.
    pub async fn records(&self) -> Result<Vec<DataRecord>> {
        Ok(self.registry.list_records().await?)
    }

    /// Grants, optionally for one record.
    pub async fn grants(&self, content_id: Option<&ContentId>) -> Result<Vec<AccessGrant>> {
        Ok(self.registry.list_grants(content_id).await?)
    }

    async fn fetch_verified(&self, content_id: &ContentId) -> Result<(DataRecord, Bytes)> {
        let record = self
            .registry
            .get_record(content_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("record {}", content_id)))?;
        let blob = self
            .content
            .get(content_id)
            .await
            .map_err(|e| EngineError::FetchFailed {
                content_id: content_id.clone(),
                reason: e.to_string(),
            })?;

        if !record.verify_content(&blob) {
            return Err(EngineError::IntegrityMismatch(content_id.clone()));
        }
        Ok((record, blob))
    }
}
