//! Local durable registry: a single JSON document on disk.
//!
//! Every operation is a read-modify-write of the whole document under an
//! exclusive `fs2` lock on a sibling `.lock` file, and writes replace the
//! document through a temp file + rename. Two processes sharing the file
//! therefore observe `complete_grant` as atomic.
//!
//! A missing or empty file is the empty document. A document that fails to
//! parse or validate is moved aside to `<name>.corrupt-<millis>` and the
//! registry restarts empty.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pregrant_core::{now_millis, AccessGrant, Completion, ContentId, DataRecord, PrincipalId};
use tracing::{debug, warn};

use crate::document::RegistryDocument;
use crate::error::{Result, StoreError};
use crate::fs::{lock_exclusive, write_atomic};
use crate::traits::{InsertResult, Registry};

/// JSON-file registry.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    paths: Arc<Paths>,
}

#[derive(Debug)]
struct Paths {
    document: PathBuf,
    lock: PathBuf,
}

impl JsonFileRegistry {
    /// Open (or lazily create) the registry at `path`.
    ///
    /// Loads the document once so a malformed file is reset at startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let document = path.as_ref().to_path_buf();
        let mut lock = document.clone().into_os_string();
        lock.push(".lock");

        let registry = Self {
            paths: Arc::new(Paths {
                document,
                lock: PathBuf::from(lock),
            }),
        };

        let _lock = lock_exclusive(&registry.paths.lock)?;
        load_document(&registry.paths.document)?;
        Ok(registry)
    }

    /// Path of the JSON document.
    pub fn path(&self) -> &Path {
        &self.paths.document
    }

    /// Run `f` against the locked document on the blocking pool.
    ///
    /// The document is written back only when `f` reports a change.
    async fn with_document<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegistryDocument) -> Result<(T, bool)> + Send + 'static,
        T: Send + 'static,
    {
        let paths = self.paths.clone();

        tokio::task::spawn_blocking(move || {
            let _lock = lock_exclusive(&paths.lock)?;
            let mut document = load_document(&paths.document)?;

            let (value, changed) = f(&mut document)?;
            if changed {
                save_document(&paths.document, &document)?;
            }
            Ok(value)
        })
        .await
        .map_err(StoreError::join)?
    }
}

/// Load the document, resetting it if it is malformed. Caller holds the lock.
fn load_document(path: &Path) -> Result<RegistryDocument> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RegistryDocument::new());
        }
        Err(e) => return Err(e.into()),
    };

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(RegistryDocument::new());
    }

    let parsed = serde_json::from_slice::<RegistryDocument>(&bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))
        .and_then(|doc| doc.validate().map(|_| doc));

    match parsed {
        Ok(document) => Ok(document),
        Err(e) => {
            let mut backup = path.as_os_str().to_os_string();
            backup.push(format!(".corrupt-{}", now_millis()));
            let backup = PathBuf::from(backup);

            warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %e,
                "malformed registry document, resetting to empty"
            );

            std::fs::rename(path, &backup)?;
            let empty = RegistryDocument::new();
            save_document(path, &empty)?;
            Ok(empty)
        }
    }
}

fn save_document(path: &Path, document: &RegistryDocument) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(document)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    write_atomic(path, &bytes)?;
    debug!(
        path = %path.display(),
        records = document.records.len(),
        grants = document.grants.len(),
        "registry document saved"
    );
    Ok(())
}

#[async_trait]
impl Registry for JsonFileRegistry {
    async fn put_record(&self, record: &DataRecord) -> Result<InsertResult> {
        let record = record.clone();
        self.with_document(move |doc| {
            let result = doc.put_record(&record)?;
            Ok((result, result == InsertResult::Inserted))
        })
        .await
    }

    async fn get_record(&self, content_id: &ContentId) -> Result<Option<DataRecord>> {
        let content_id = content_id.clone();
        self.with_document(move |doc| Ok((doc.get_record(&content_id).cloned(), false)))
            .await
    }

    async fn list_records(&self) -> Result<Vec<DataRecord>> {
        self.with_document(|doc| Ok((doc.records.clone(), false)))
            .await
    }

    async fn put_grant(&self, grant: &AccessGrant) -> Result<()> {
        let grant = grant.clone();
        self.with_document(move |doc| {
            doc.put_grant(&grant)?;
            Ok(((), true))
        })
        .await
    }

    async fn get_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
    ) -> Result<Option<AccessGrant>> {
        let (content_id, recipient_id) = (content_id.clone(), recipient_id.clone());
        self.with_document(move |doc| {
            Ok((doc.get_grant(&content_id, &recipient_id).cloned(), false))
        })
        .await
    }

    async fn list_grants(&self, content_id: Option<&ContentId>) -> Result<Vec<AccessGrant>> {
        let content_id = content_id.cloned();
        self.with_document(move |doc| Ok((doc.list_grants(content_id.as_ref()), false)))
            .await
    }

    async fn complete_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        transformed_content_id: &ContentId,
    ) -> Result<Completion> {
        let (content_id, recipient_id, transformed) = (
            content_id.clone(),
            recipient_id.clone(),
            transformed_content_id.clone(),
        );
        self.with_document(move |doc| {
            let completion = doc.complete_grant(&content_id, &recipient_id, &transformed)?;
            Ok((completion, completion == Completion::Completed))
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregrant_core::{FragmentRef, GrantKey};
    use tempfile::TempDir;

    fn grant(content: &str, recipient: &str) -> AccessGrant {
        let key = GrantKey::new(content.into(), recipient.into());
        AccessGrant::issue(
            key.content_id.clone(),
            "owner".into(),
            key.recipient_id.clone(),
            "ab".repeat(32),
            FragmentRef::for_grant(&key.grant_id()),
        )
    }

    fn backups(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".corrupt-"))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = JsonFileRegistry::open(dir.path().join("registry.json")).unwrap();
        assert!(registry.list_records().await.unwrap().is_empty());
        assert!(registry.list_grants(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");

        let registry = JsonFileRegistry::open(&path).unwrap();
        let record = DataRecord::new("X1".into(), b"blob", "owner".into(), "sensor-1");
        registry.put_record(&record).await.unwrap();
        registry.put_grant(&grant("X1", "R1")).await.unwrap();
        registry
            .complete_grant(&"X1".into(), &"R1".into(), &"X2".into())
            .await
            .unwrap();
        drop(registry);

        let reopened = JsonFileRegistry::open(&path).unwrap();
        assert_eq!(reopened.list_records().await.unwrap(), vec![record]);
        let g = reopened
            .get_grant(&"X1".into(), &"R1".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(g.transformed_content_id, Some("X2".into()));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw["records"].is_array());
        assert!(raw["grants"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_document_resets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"{\"records\": [oops").unwrap();

        let registry = JsonFileRegistry::open(&path).unwrap();
        assert!(registry.list_records().await.unwrap().is_empty());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"records": [], "grants": []}));
        assert_eq!(backups(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_document_violating_invariant_resets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");

        let mut broken = grant("X1", "R1");
        broken.transformed_content_id = Some("X2".into());
        let doc = RegistryDocument {
            records: vec![],
            grants: vec![broken],
        };
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let registry = JsonFileRegistry::open(&path).unwrap();
        assert!(registry.list_grants(None).await.unwrap().is_empty());
        assert_eq!(backups(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_two_handles_share_one_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        let a = JsonFileRegistry::open(&path).unwrap();
        let b = JsonFileRegistry::open(&path).unwrap();

        a.put_grant(&grant("X1", "R1")).await.unwrap();
        assert!(matches!(
            b.put_grant(&grant("X1", "R1")).await,
            Err(StoreError::Conflict(_))
        ));

        let (c, r) = (ContentId::new("X1"), PrincipalId::new("R1"));
        let t: ContentId = "X2".into();
        let (ra, rb) = tokio::join!(
            a.complete_grant(&c, &r, &t),
            b.complete_grant(&c, &r, &t)
        );
        let mut outcomes = vec![ra.unwrap(), rb.unwrap()];
        outcomes.sort_by_key(|o| *o == Completion::AlreadyCompleted);
        assert_eq!(
            outcomes,
            vec![Completion::Completed, Completion::AlreadyCompleted]
        );

        assert!(matches!(
            b.complete_grant(&c, &r, &"X3".into()).await,
            Err(StoreError::AlreadyTransformed { .. })
        ));
    }
}
