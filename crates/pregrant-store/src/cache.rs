//! Local cache of transformed blobs for fast recipient access.
//!
//! Files live at `<dir>/<grant_id>.json`. The content
//! store stays the source of truth: a cached file is only served if its bytes
//! still hash to the transformed id the registry recorded.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use pregrant_core::{ContentId, GrantKey, PrincipalId};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::fs::write_atomic;

#[derive(Debug, Clone)]
pub struct TransformedCache {
    dir: PathBuf,
}

impl TransformedCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, content_id: &ContentId, recipient_id: &PrincipalId) -> PathBuf {
        let key = GrantKey::new(content_id.clone(), recipient_id.clone());
        self.dir.join(format!("{}.json", key.grant_id().to_hex()))
    }

    /// Store the transformed blob for `(content_id, recipient_id)`.
    pub async fn store(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        blob: Bytes,
    ) -> Result<PathBuf> {
        let path = self.path_for(content_id, recipient_id);
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &blob))
            .await
            .map_err(StoreError::join)??;
        debug!(content_id = %content_id, recipient_id = %recipient_id, path = %path.display(), "transformed blob cached");
        Ok(path)
    }

    /// Load a cached blob if present and still addressed by `expected`.
    pub async fn load(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        expected: &ContentId,
    ) -> Result<Option<Bytes>> {
        let path = self.path_for(content_id, recipient_id);
        let bytes = tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        })
        .await
        .map_err(StoreError::join)??;

        match bytes {
            Some(bytes) if ContentId::for_bytes(&bytes) == *expected => Ok(Some(Bytes::from(bytes))),
            Some(_) => {
                debug!(content_id = %content_id, recipient_id = %recipient_id, "stale transformed cache entry ignored");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
