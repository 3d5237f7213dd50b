//! The Engine: explicit wiring of registry, content store, key material and
//! scheme.
//!
//! Nothing is global. An [`Engine`] is built once per process from a
//! configuration and hands out owners, recipients and proxy workers that
//! share its backends.

use std::sync::Arc;

use pregrant_core::PrincipalId;
use pregrant_pre::{PreScheme, RistrettoPre};
use pregrant_store::{ContentStore, JsonFileRegistry, Registry, SqliteContentStore, TransformedCache};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::keys::KeyMaterialManager;
use crate::owner::Owner;
use crate::recipient::Recipient;
use crate::worker::{ProxyWorker, WorkerConfig};

/// Shared backends and configuration.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    registry: Arc<dyn Registry>,
    content: Arc<dyn ContentStore>,
    keys: Arc<KeyMaterialManager>,
}

impl Engine {
    /// Build an engine over caller-supplied backends.
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn Registry>,
        content: Arc<dyn ContentStore>,
        scheme: Arc<dyn PreScheme>,
    ) -> Result<Self> {
        config.validate()?;
        let keys = Arc::new(KeyMaterialManager::new(
            config.keys_dir(),
            config.fragments_dir(),
            scheme,
        ));
        Ok(Self {
            config,
            registry,
            content,
            keys,
        })
    }

    /// Open the local backends under `config.data_dir`.
    ///
    /// Fails with `BackendUnavailable` if either store cannot be opened.
    pub async fn open_local(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            crate::error::EngineError::BackendUnavailable(format!(
                "{}: {}",
                config.data_dir.display(),
                e
            ))
        })?;

        let registry = JsonFileRegistry::open(config.registry_path())?;
        let content = SqliteContentStore::open(config.content_db_path())?;
        info!(data_dir = %config.data_dir.display(), "local backends opened");

        Self::new(
            config,
            Arc::new(registry),
            Arc::new(content),
            Arc::new(RistrettoPre::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn keys(&self) -> &Arc<KeyMaterialManager> {
        &self.keys
    }

    fn cache(&self) -> Option<TransformedCache> {
        self.config
            .cache_transformed
            .then(|| TransformedCache::new(self.config.transformed_dir()))
    }

    /// An owner, creating the owner's key pair on first use.
    pub async fn owner(&self, owner_id: impl Into<PrincipalId>) -> Result<Owner> {
        let material = self.keys.load_or_create(&owner_id.into()).await?;
        Ok(Owner::new(
            material,
            Arc::clone(&self.registry),
            Arc::clone(&self.content),
            Arc::clone(&self.keys),
            self.config.threshold,
            self.config.shares,
        ))
    }

    /// A recipient, creating the recipient's key pair on first use.
    pub async fn recipient(&self, recipient_id: impl Into<PrincipalId>) -> Result<Recipient> {
        let material = self.keys.load_or_create(&recipient_id.into()).await?;
        Ok(Recipient::new(
            material,
            Arc::clone(&self.registry),
            Arc::clone(&self.content),
            Arc::clone(&self.keys),
            self.cache(),
        ))
    }

    /// A proxy worker over this engine's backends.
    pub fn worker(&self) -> ProxyWorker {
        ProxyWorker::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.content),
            Arc::clone(&self.keys),
            self.cache(),
            WorkerConfig {
                poll_interval: self.config.poll_interval,
                call_timeout: self.config.call_timeout,
            },
        )
    }
}
