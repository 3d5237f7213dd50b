//! Key Material Manager.
//!
//! Owns key pairs per identity and the key fragments issued per grant.
//!
//! ## Layout
//!
//! ```text
//! keys/<stem>.key            CBOR {version, identity, secret, public}
//! keys/<stem>.pub            CBOR {version, identity, public}, readable by anyone
//! fragments/<grant_id>.cbor  CBOR {version, content_id, recipient_id, fragments}
//! ```
//!
//! `<stem>` is [`PrincipalId::file_stem`], distinct for distinct identities.
//! Every file names the identity or grant it belongs to and is checked
//! against it on read.
//!
//! Key files and fragment files are created with create-if-absent
//! semantics: the first writer wins, later writers adopt what is on disk.
//! A fragment set already stored for a grant is only adopted if it
//! delegates between the same pair of keys.
//! Secret bytes never leave this module except through [`KeyMaterial`],
//! whose secret half is crate-private.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pregrant_core::{FragmentRef, GrantKey, PrincipalId};
use pregrant_pre::{KeyFragment, PreScheme, PublicKey, SecretKey};
use pregrant_store::fs::write_new;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};

const KEY_FILE_VERSION: u8 = 1;
const FRAGMENT_FILE_VERSION: u8 = 1;

/// A key pair bound to an identity.
#[derive(Clone)]
pub struct KeyMaterial {
    identity: PrincipalId,
    secret: SecretKey,
    public: PublicKey,
}

impl KeyMaterial {
    pub fn identity(&self) -> &PrincipalId {
        &self.identity
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("identity", &self.identity)
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u8,
    identity: String,
    secret: [u8; 32],
    public: PublicKey,
}

impl Drop for KeyFile {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.secret);
    }
}

#[derive(Serialize, Deserialize)]
struct PublicKeyFile {
    version: u8,
    identity: String,
    public: PublicKey,
}

#[derive(Serialize, Deserialize)]
struct FragmentFile {
    version: u8,
    content_id: String,
    recipient_id: String,
    fragments: Vec<Vec<u8>>,
}

/// Generates, persists and loads key pairs and key fragments.
pub struct KeyMaterialManager {
    keys_dir: PathBuf,
    fragments_dir: PathBuf,
    scheme: Arc<dyn PreScheme>,
}

impl KeyMaterialManager {
    pub fn new(
        keys_dir: impl Into<PathBuf>,
        fragments_dir: impl Into<PathBuf>,
        scheme: Arc<dyn PreScheme>,
    ) -> Self {
        Self {
            keys_dir: keys_dir.into(),
            fragments_dir: fragments_dir.into(),
            scheme,
        }
    }

    pub fn scheme(&self) -> &Arc<dyn PreScheme> {
        &self.scheme
    }

    fn key_path(&self, identity: &PrincipalId) -> PathBuf {
        self.keys_dir.join(format!("{}.key", identity.file_stem()))
    }

    fn public_path(&self, identity: &PrincipalId) -> PathBuf {
        self.keys_dir.join(format!("{}.pub", identity.file_stem()))
    }

    fn fragment_path(&self, key: &GrantKey) -> PathBuf {
        self.fragments_dir
            .join(format!("{}.cbor", key.grant_id().to_hex()))
    }

    /// Return the key pair for `identity`, generating it on first use.
    ///
    /// Concurrent first calls race on an exclusive create; every caller ends
    /// up with the winner's pair.
    pub async fn load_or_create(&self, identity: &PrincipalId) -> Result<KeyMaterial> {
        if identity.is_empty() {
            return Err(EngineError::Invalid("identity must not be empty".into()));
        }

        let key_path = self.key_path(identity);
        let public_path = self.public_path(identity);
        let identity = identity.clone();
        let scheme = Arc::clone(&self.scheme);

        tokio::task::spawn_blocking(move || {
            let material = match read_key_file(&key_path, &identity)? {
                Some(material) => material,
                None => {
                    let (secret, public) = scheme.generate_keypair();
                    let file = KeyFile {
                        version: KEY_FILE_VERSION,
                        identity: identity.as_str().to_string(),
                        secret: *secret.to_bytes(),
                        public,
                    };
                    let mut bytes = Zeroizing::new(Vec::new());
                    ciborium::into_writer(&file, &mut *bytes)
                        .map_err(|e| EngineError::KeyMaterial(e.to_string()))?;

                    if write_new(&key_path, &bytes)? {
                        info!(identity = %identity, public_key = %public, "key pair created");
                        KeyMaterial {
                            identity: identity.clone(),
                            secret,
                            public,
                        }
                    } else {
                        debug!(identity = %identity, "lost key creation race, adopting existing pair");
                        read_key_file(&key_path, &identity)?.ok_or_else(|| {
                            EngineError::KeyMaterial(format!(
                                "{} vanished after creation race",
                                key_path.display()
                            ))
                        })?
                    }
                }
            };

            let sidecar = PublicKeyFile {
                version: KEY_FILE_VERSION,
                identity: identity.as_str().to_string(),
                public: material.public,
            };
            let mut bytes = Vec::new();
            ciborium::into_writer(&sidecar, &mut bytes)
                .map_err(|e| EngineError::KeyMaterial(e.to_string()))?;
            if !write_new(&public_path, &bytes)? {
                match read_public_file(&public_path, &identity)? {
                    Some(public) if public == material.public => {}
                    _ => {
                        return Err(EngineError::KeyMaterial(format!(
                            "{} does not match the key pair of {}",
                            public_path.display(),
                            identity
                        )))
                    }
                }
            }
            Ok(material)
        })
        .await
        .map_err(|e| EngineError::KeyMaterial(format!("key task failed: {}", e)))?
    }

    /// Look up the published public key of `identity`.
    pub async fn public_key_of(&self, identity: &PrincipalId) -> Result<PublicKey> {
        let path = self.public_path(identity);
        let identity = identity.clone();
        tokio::task::spawn_blocking(move || {
            read_public_file(&path, &identity)?.ok_or_else(|| {
                EngineError::NotFound(format!("public key for {}", identity))
            })
        })
        .await
        .map_err(|e| EngineError::KeyMaterial(format!("key task failed: {}", e)))?
    }

    /// Derive the fragment set delegating `owner` to `recipient`.
    pub fn derive_fragments(
        &self,
        owner: &KeyMaterial,
        recipient: &PublicKey,
        threshold: usize,
        shares: usize,
    ) -> Result<Vec<KeyFragment>> {
        Ok(self
            .scheme
            .derive_fragments(owner.secret_key(), recipient, threshold, shares)?)
    }

    /// Store a fragment set for `key` and return its locator.
    ///
    /// If a set is already stored for the same key it is kept and its
    /// locator returned, provided it delegates from the same owner to the
    /// same recipient. Otherwise the call fails with `Conflict`.
    pub async fn persist_fragments(
        &self,
        fragments: &[KeyFragment],
        key: &GrantKey,
    ) -> Result<FragmentRef> {
        if fragments.is_empty() {
            return Err(EngineError::Invalid("empty fragment set".into()));
        }

        let file = FragmentFile {
            version: FRAGMENT_FILE_VERSION,
            content_id: key.content_id.as_str().to_string(),
            recipient_id: key.recipient_id.as_str().to_string(),
            fragments: fragments.iter().map(|f| f.to_bytes().to_vec()).collect(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&file, &mut bytes)
            .map_err(|e| EngineError::KeyMaterial(e.to_string()))?;

        let path = self.fragment_path(key);
        let created = tokio::task::spawn_blocking(move || write_new(&path, &bytes))
            .await
            .map_err(|e| EngineError::KeyMaterial(format!("fragment task failed: {}", e)))??;

        let reference = FragmentRef::for_grant(&key.grant_id());
        if !created {
            let existing = self.load_fragments(&reference, key).await.map_err(|e| {
                EngineError::Conflict(format!("fragments for {} already stored: {}", key, e))
            })?;
            let same_delegation = existing.iter().all(|f| {
                f.delegating_pk() == fragments[0].delegating_pk()
                    && f.receiving_pk() == fragments[0].receiving_pk()
            });
            if !same_delegation {
                return Err(EngineError::Conflict(format!(
                    "fragments stored for {} delegate between other keys",
                    key
                )));
            }
        }
        debug!(
            content_id = %key.content_id,
            recipient_id = %key.recipient_id,
            fragment_reference = %reference.as_str(),
            created,
            "fragments persisted"
        );
        Ok(reference)
    }

    /// Load the fragment set behind `reference`.
    ///
    /// Every failure is [`EngineError::FragmentUnavailable`].
    pub async fn load_fragments(
        &self,
        reference: &FragmentRef,
        key: &GrantKey,
    ) -> Result<Vec<KeyFragment>> {
        let unavailable = |reason: String| EngineError::FragmentUnavailable {
            key: key.clone(),
            reason,
        };

        let grant_id = reference
            .grant_id()
            .ok_or_else(|| unavailable(format!("bad locator {}", reference.as_str())))?;
        if grant_id != key.grant_id() {
            return Err(unavailable(format!(
                "locator {} belongs to another grant",
                reference.as_str()
            )));
        }

        let path = self
            .fragments_dir
            .join(format!("{}.cbor", grant_id.to_hex()));
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(&path))
            .await
            .map_err(|e| unavailable(format!("fragment task failed: {}", e)))?
            .map_err(|e| unavailable(e.to_string()))?;

        let file: FragmentFile =
            ciborium::from_reader(bytes.as_slice()).map_err(|e| unavailable(e.to_string()))?;
        if file.version != FRAGMENT_FILE_VERSION {
            return Err(unavailable(format!("unsupported version {}", file.version)));
        }
        if file.content_id != key.content_id.as_str() || file.recipient_id != key.recipient_id.as_str()
        {
            return Err(unavailable("fragment file names another grant".into()));
        }

        let fragments = file
            .fragments
            .iter()
            .map(|raw| KeyFragment::from_bytes(raw))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| unavailable(e.to_string()))?;
        if fragments.is_empty() {
            return Err(unavailable("empty fragment set".into()));
        }
        Ok(fragments)
    }
}

fn read_public_file(path: &Path, identity: &PrincipalId) -> Result<Option<PublicKey>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::KeyMaterial(e.to_string())),
    };

    let file: PublicKeyFile = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| EngineError::KeyMaterial(format!("{}: {}", path.display(), e)))?;
    if file.version != KEY_FILE_VERSION {
        return Err(EngineError::KeyMaterial(format!(
            "{}: unsupported version {}",
            path.display(),
            file.version
        )));
    }
    if file.identity != identity.as_str() {
        return Err(EngineError::KeyMaterial(format!(
            "{} belongs to {}, not {}",
            path.display(),
            file.identity,
            identity
        )));
    }
    Ok(Some(file.public))
}

fn read_key_file(path: &Path, identity: &PrincipalId) -> Result<Option<KeyMaterial>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => Zeroizing::new(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::KeyMaterial(e.to_string())),
    };

    let file: KeyFile = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| EngineError::KeyMaterial(format!("{}: {}", path.display(), e)))?;
    if file.version != KEY_FILE_VERSION {
        return Err(EngineError::KeyMaterial(format!(
            "{}: unsupported version {}",
            path.display(),
            file.version
        )));
    }
    if file.identity != identity.as_str() {
        return Err(EngineError::KeyMaterial(format!(
            "{} belongs to {}, not {}",
            path.display(),
            file.identity,
            identity
        )));
    }

    let secret = SecretKey::from_bytes(&file.secret)?;
    if secret.public_key() != file.public {
        return Err(EngineError::KeyMaterial(format!(
            "{}: public key does not match secret",
            path.display()
        )));
    }

    Ok(Some(KeyMaterial {
        identity: identity.clone(),
        secret,
        public: file.public,
    }))
}
