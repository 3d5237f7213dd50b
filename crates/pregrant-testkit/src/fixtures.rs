//! Test fixtures and helpers.
//!
//! Common setup for integration tests: engines over each registry backend,
//! a second engine sharing the same state (a "peer process"), and content
//! stores that fail on demand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pregrant::{Engine, EngineConfig, Result as EngineResult};
use pregrant_core::{AccessGrant, ContentId, DataRecord, GrantKey, Keypair, PrincipalId};
use pregrant_ledger::client::memory::MemoryLedger;
use pregrant_ledger::LedgerRegistry;
use pregrant_pre::RistrettoPre;
use pregrant_store::{
    ContentStore, MemoryContentStore, MemoryRegistry, Registry, Result as StoreResult, StoreError,
};
use tempfile::TempDir;

/// Which registry backend a fixture runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-memory registry and content store.
    Memory,
    /// `registry.json` and `content.db` under the fixture directory.
    Local,
    /// In-process ledger, in-memory content store.
    Ledger,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Memory, Backend::Local, Backend::Ledger];
}

enum Shared {
    Memory {
        registry: Arc<MemoryRegistry>,
        content: Arc<MemoryContentStore>,
    },
    Local,
    Ledger {
        ledger: Arc<MemoryLedger>,
        content: Arc<MemoryContentStore>,
    },
}

/// An engine over a temporary data directory.
pub struct TestFixture {
    pub dir: TempDir,
    pub engine: Engine,
    shared: Shared,
}

/// Configuration tuned for tests: short polls and timeouts.
pub fn test_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(20),
        call_timeout: Duration::from_secs(2),
        ..EngineConfig::with_data_dir(dir.path())
    }
}

impl TestFixture {
    /// A fixture on `backend` with the test configuration.
    pub async fn new(backend: Backend) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(&dir);
        Self::with_config(backend, dir, config).await
    }

    /// A fixture on `backend` with a caller-adjusted configuration.
    pub async fn with_config(backend: Backend, dir: TempDir, config: EngineConfig) -> Self {
        let (engine, shared) = match backend {
            Backend::Memory => {
                let registry = Arc::new(MemoryRegistry::new());
                let content = Arc::new(MemoryContentStore::new());
                let engine = Engine::new(
                    config,
                    registry.clone(),
                    content.clone(),
                    Arc::new(RistrettoPre::new()),
                )
                .expect("engine");
                (engine, Shared::Memory { registry, content })
            }
            Backend::Local => {
                let engine = Engine::open_local(config).await.expect("local engine");
                (engine, Shared::Local)
            }
            Backend::Ledger => {
                let ledger = Arc::new(MemoryLedger::new());
                let content = Arc::new(MemoryContentStore::new());
                let registry = LedgerRegistry::new(Arc::clone(&ledger), Keypair::generate());
                let engine = Engine::new(
                    config,
                    Arc::new(registry),
                    content.clone(),
                    Arc::new(RistrettoPre::new()),
                )
                .expect("engine");
                (engine, Shared::Ledger { ledger, content })
            }
        };

        Self {
            dir,
            engine,
            shared,
        }
    }

    /// Another engine over the same registry, content and key directories,
    /// with its own backend handles and its own ledger account.
    pub async fn peer(&self) -> Engine {
        self.peer_with_content(None).await
    }

    /// Like [`peer`](Self::peer) but reading content through `content`.
    pub async fn peer_with_content(&self, content: Option<Arc<dyn ContentStore>>) -> Engine {
        let config = self.engine.config().clone();
        let scheme = Arc::new(RistrettoPre::new());
        match &self.shared {
            Shared::Memory {
                registry,
                content: shared,
            } => Engine::new(
                config,
                registry.clone(),
                content.unwrap_or_else(|| shared.clone() as Arc<dyn ContentStore>),
                scheme,
            )
            .expect("engine"),
            Shared::Local => {
                let local = Engine::open_local(config.clone()).await.expect("local engine");
                match content {
                    Some(content) => {
                        Engine::new(config, Arc::clone(local.registry()), content, scheme)
                            .expect("engine")
                    }
                    None => local,
                }
            }
            Shared::Ledger {
                ledger,
                content: shared,
            } => Engine::new(
                config,
                Arc::new(LedgerRegistry::new(Arc::clone(ledger), Keypair::generate())),
                content.unwrap_or_else(|| shared.clone() as Arc<dyn ContentStore>),
                scheme,
            )
            .expect("engine"),
        }
    }

    /// The ledger behind a `Ledger` fixture.
    pub fn ledger(&self) -> Option<&Arc<MemoryLedger>> {
        match &self.shared {
            Shared::Ledger { ledger, .. } => Some(ledger),
            _ => None,
        }
    }

    /// Produce `payload` as `owner` and grant it to each of `recipients`.
    pub async fn produce_and_grant(
        &self,
        owner: &str,
        recipients: &[&str],
        payload: &[u8],
    ) -> EngineResult<(DataRecord, Vec<AccessGrant>)> {
        let owner = self.engine.owner(owner).await?;
        let record = owner.produce(payload, "sensor-1").await?;

        let mut grants = Vec::new();
        for recipient in recipients {
            self.engine.recipient(*recipient).await?;
            grants.push(owner.grant(&record.content_id, &PrincipalId::new(*recipient)).await?);
        }
        Ok((record, grants))
    }

    /// Record arbitrary `blob` bytes as `owner`'s data and grant them to
    /// `recipient`, bypassing encryption. Used to plant corrupt blobs.
    pub async fn plant_grant(
        &self,
        owner: &str,
        recipient: &str,
        blob: &[u8],
    ) -> EngineResult<AccessGrant> {
        let keys = self.engine.keys();
        let owner_material = keys.load_or_create(&owner.into()).await?;
        let recipient_material = keys.load_or_create(&recipient.into()).await?;

        let content_id = self
            .engine
            .content()
            .put(Bytes::copy_from_slice(blob))
            .await?;
        let record = DataRecord::new(content_id.clone(), blob, owner.into(), "planted");
        self.engine.registry().put_record(&record).await?;

        let key = GrantKey::new(content_id.clone(), recipient.into());
        let fragments = keys.derive_fragments(
            &owner_material,
            recipient_material.public_key(),
            1,
            1,
        )?;
        let reference = keys.persist_fragments(&fragments, &key).await?;

        let grant = AccessGrant::issue(
            content_id,
            owner.into(),
            recipient.into(),
            recipient_material.public_key().to_hex(),
            reference,
        );
        self.engine.registry().put_grant(&grant).await?;
        Ok(grant)
    }

    /// Current state of one grant.
    pub async fn grant_state(&self, content_id: &ContentId, recipient: &str) -> Option<AccessGrant> {
        self.engine
            .registry()
            .get_grant(content_id, &recipient.into())
            .await
            .expect("registry reachable")
    }
}

/// A content store whose reads fail or stall on demand.
pub struct FlakyContentStore {
    inner: Arc<dyn ContentStore>,
    failures_left: AtomicUsize,
    stall: Option<Duration>,
}

impl FlakyContentStore {
    /// Fail the next `failures` reads with `Unavailable`, then pass through.
    pub fn failing(inner: Arc<dyn ContentStore>, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            stall: None,
        }
    }

    /// Sleep `stall` before every read.
    pub fn stalling(inner: Arc<dyn ContentStore>, stall: Duration) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            stall: Some(stall),
        }
    }

    pub fn failures_left(&self) -> usize {
        self.failures_left.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for FlakyContentStore {
    async fn put(&self, bytes: Bytes) -> StoreResult<ContentId> {
        self.inner.put(bytes).await
    }

    async fn get(&self, id: &ContentId) -> StoreResult<Bytes> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        self.inner.get(id).await
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}
