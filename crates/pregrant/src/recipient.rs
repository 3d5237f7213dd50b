//! Recipient workflow: find granted access and decrypt transformed blobs.

use std::sync::Arc;

use bytes::Bytes;
use pregrant_core::{AccessGrant, ContentId, PrincipalId, TransformedBlob};
use pregrant_pre::{Capsule, CapsuleFragment, PublicKey, CFRAG_LEN};
use pregrant_store::{ContentStore, Registry, TransformedCache};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::keys::{KeyMaterial, KeyMaterialManager};

/// A recipient bound to its key material and the shared backends.
pub struct Recipient {
    material: KeyMaterial,
    registry: Arc<dyn Registry>,
    content: Arc<dyn ContentStore>,
    keys: Arc<KeyMaterialManager>,
    cache: Option<TransformedCache>,
}

impl Recipient {
    pub(crate) fn new(
        material: KeyMaterial,
        registry: Arc<dyn Registry>,
        content: Arc<dyn ContentStore>,
        keys: Arc<KeyMaterialManager>,
        cache: Option<TransformedCache>,
    ) -> Self {
        Self {
            material,
            registry,
            content,
            keys,
            cache,
        }
    }

    pub fn id(&self) -> &PrincipalId {
        self.material.identity()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.material.public_key()
    }

    /// Every grant naming this recipient.
    pub async fn access_list(&self) -> Result<Vec<AccessGrant>> {
        let grants = self.registry.list_grants(None).await?;
        Ok(grants
            .into_iter()
            .filter(|g| g.recipient_id == *self.id())
            .collect())
    }

    /// Decrypt the record `content_id` through this recipient's grant.
    pub async fn decrypt(&self, content_id: &ContentId) -> Result<Vec<u8>> {
        let grant = self
            .registry
            .get_grant(content_id, self.id())
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("grant ({}, {})", content_id, self.id()))
            })?;
        let transformed_id =
            grant
                .transformed_content_id
                .clone()
                .ok_or_else(|| EngineError::NotTransformed {
                    content_id: content_id.clone(),
                    recipient_id: self.id().clone(),
                })?;

        let bytes = self.fetch_transformed(content_id, &transformed_id).await?;
        let corrupt = |reason: String| EngineError::BlobCorrupt {
            content_id: transformed_id.clone(),
            reason,
        };

        let blob = TransformedBlob::from_json_bytes(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if blob.recipient_id != *self.id() || blob.original_content_id != *content_id {
            return Err(corrupt(format!(
                "blob addressed to ({}, {})",
                blob.original_content_id, blob.recipient_id
            )));
        }

        let capsule = Capsule::from_bytes(&blob.capsule).map_err(|e| corrupt(e.to_string()))?;
        if blob.capsule_fragment.len() % CFRAG_LEN != 0 {
            return Err(corrupt(format!(
                "capsule fragment length {} is not a multiple of {}",
                blob.capsule_fragment.len(),
                CFRAG_LEN
            )));
        }
        let cfrags = blob
            .capsule_fragment
            .chunks(CFRAG_LEN)
            .map(CapsuleFragment::from_bytes)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| corrupt(e.to_string()))?;

        let owner_pk = self.keys.public_key_of(&grant.owner_id).await?;
        let plaintext = self.keys.scheme().combine_and_decrypt(
            self.material.secret_key(),
            &owner_pk,
            &capsule,
            &cfrags,
            &blob.ciphertext,
        )?;

        debug!(content_id = %content_id, recipient_id = %self.id(), "transformed blob decrypted");
        Ok(plaintext)
    }

    /// The transformed blob, from the local cache when it is still valid.
    async fn fetch_transformed(
        &self,
        content_id: &ContentId,
        transformed_id: &ContentId,
    ) -> Result<Bytes> {
        if let Some(cache) = &self.cache {
            match cache.load(content_id, self.id(), transformed_id).await {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => {}
                Err(e) => warn!(content_id = %content_id, error = %e, "transformed cache unreadable"),
            }
        }

        self.content
            .get(transformed_id)
            .await
            .map_err(|e| EngineError::FetchFailed {
                content_id: transformed_id.clone(),
                reason: e.to_string(),
            })
    }
}
