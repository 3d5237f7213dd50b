//! Proxy Worker: the grant lifecycle engine.
//!
//! One pass lists every grant, keeps those still `Issued` and not held in
//! quarantine, and for each one in registry order:
//!
//! 1. loads the grant's key fragments and checks they delegate from the
//!    grant's owner to the grant's recipient key,
//! 2. fetches and parses the encrypted blob,
//! 3. transforms the capsule with every fragment,
//! 4. stores the transformed blob,
//! 5. commits the new id through `complete_grant`,
//! 6. caches the transformed blob locally.
//!
//! The transform is deterministic and the transformed blob is content
//! addressed, so two honest workers racing on one grant produce the same id
//! and the registry's atomic completion settles the race. A completion that
//! names a different id is reported as double processing.
//!
//! Every registry and content store call is bounded by the configured
//! timeout and retried once if the failure is transient. Anything still
//! failing is reported against the grant, which stays `Issued` for the next
//! pass. `BlobCorrupt`, `TransformFailed` and double processing put the
//! grant in quarantine instead.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use pregrant_core::{AccessGrant, Completion, ContentId, EncryptedBlob, GrantKey, TransformedBlob};
use pregrant_pre::{Capsule, CapsuleFragment, KeyFragment, PublicKey};
use pregrant_store::{ContentStore, Registry, TransformedCache};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::keys::KeyMaterialManager;

/// Timing for the worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub call_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// What happened to one grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// This worker committed the transformation.
    Transformed(ContentId),
    /// Another worker committed the same transformation first.
    AlreadyTransformed(ContentId),
}

impl GrantOutcome {
    pub fn transformed_content_id(&self) -> &ContentId {
        match self {
            GrantOutcome::Transformed(id) | GrantOutcome::AlreadyTransformed(id) => id,
        }
    }
}

/// Report of one pass over the registry.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Grants that were `Issued` when listed and not quarantined.
    pub considered: usize,
    pub completed: Vec<(GrantKey, GrantOutcome)>,
    pub failures: Vec<(GrantKey, EngineError)>,
    /// Grants skipped because they are in quarantine.
    pub held: usize,
    /// The pass stopped early for shutdown.
    pub interrupted: bool,
}

impl PassReport {
    /// Whether the pass found anything to do.
    pub fn found_work(&self) -> bool {
        self.considered > 0
    }
}

/// Polls a registry and transforms issued grants.
pub struct ProxyWorker {
    registry: Arc<dyn Registry>,
    content: Arc<dyn ContentStore>,
    keys: Arc<KeyMaterialManager>,
    cache: Option<TransformedCache>,
    config: WorkerConfig,
    quarantine: Mutex<HashSet<GrantKey>>,
}

impl ProxyWorker {
    pub fn new(
        registry: Arc<dyn Registry>,
        content: Arc<dyn ContentStore>,
        keys: Arc<KeyMaterialManager>,
        cache: Option<TransformedCache>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            content,
            keys,
            cache,
            config,
            quarantine: Mutex::new(HashSet::new()),
        }
    }

    /// Grants held out of passes until released.
    pub fn quarantined(&self) -> Vec<GrantKey> {
        let mut held: Vec<_> = self
            .quarantine
            .lock()
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    /// Let a quarantined grant back into passes.
    pub fn release(&self, key: &GrantKey) -> bool {
        self.quarantine
            .lock()
            .map(|mut q| q.remove(key))
            .unwrap_or(false)
    }

    fn is_quarantined(&self, key: &GrantKey) -> bool {
        self.quarantine
            .lock()
            .map(|q| q.contains(key))
            .unwrap_or(false)
    }

    fn hold(&self, key: GrantKey) {
        if let Ok(mut q) = self.quarantine.lock() {
            q.insert(key);
        }
    }

    /// Run one pass to completion.
    pub async fn run_once(&self) -> Result<PassReport> {
        self.pass(None).await
    }

    /// Poll until `shutdown` turns true.
    ///
    /// The grant in flight when shutdown is signalled is finished; the pass
    /// then stops and the loop returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            backend = self.registry.backend_name(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "proxy worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let found_work = match self.pass(Some(&shutdown)).await {
                Ok(report) => {
                    if report.interrupted {
                        break;
                    }
                    report.found_work()
                }
                Err(e) => {
                    warn!(error = %e, "pass failed");
                    false
                }
            };

            if !found_work {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("proxy worker stopped");
        Ok(())
    }

    async fn pass(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<PassReport> {
        let registry = &self.registry;
        let grants = self
            .bounded("list_grants", move || registry.list_grants(None))
            .await?;

        let mut report = PassReport::default();
        for grant in grants.into_iter().filter(|g| !g.is_transformed()) {
            if shutdown.map(|s| *s.borrow()).unwrap_or(false) {
                report.interrupted = true;
                break;
            }

            let key = grant.key();
            if self.is_quarantined(&key) {
                report.held += 1;
                continue;
            }
            report.considered += 1;

            match self.process(&grant).await {
                Ok(outcome) => {
                    info!(
                        content_id = %key.content_id,
                        recipient_id = %key.recipient_id,
                        transformed_content_id = %outcome.transformed_content_id(),
                        "grant transformed"
                    );
                    report.completed.push((key, outcome));
                }
                Err(e) if e.needs_operator() => {
                    error!(
                        content_id = %key.content_id,
                        recipient_id = %key.recipient_id,
                        error = %e,
                        "grant quarantined"
                    );
                    self.hold(key.clone());
                    report.failures.push((key, e));
                }
                Err(e) => {
                    warn!(
                        content_id = %key.content_id,
                        recipient_id = %key.recipient_id,
                        error = %e,
                        "grant skipped"
                    );
                    report.failures.push((key, e));
                }
            }
        }

        debug!(
            considered = report.considered,
            completed = report.completed.len(),
            failed = report.failures.len(),
            held = report.held,
            "pass finished"
        );
        Ok(report)
    }

    /// Transform one grant and commit the result.
    pub async fn process(&self, grant: &AccessGrant) -> Result<GrantOutcome> {
        let key = grant.key();
        let fragments = self
            .keys
            .load_fragments(&grant.fragment_reference, &key)
            .await?;
        self.check_delegation(grant, &fragments).await?;

        let content = &self.content;
        let content_id = &grant.content_id;
        let raw = self
            .bounded("content_get", move || content.get(content_id))
            .await
            .map_err(|e| EngineError::FetchFailed {
                content_id: content_id.clone(),
                reason: e.to_string(),
            })?;

        let corrupt = |reason: String| EngineError::BlobCorrupt {
            content_id: content_id.clone(),
            reason,
        };
        let blob = EncryptedBlob::from_json_bytes(&raw).map_err(|e| corrupt(e.to_string()))?;
        let capsule = Capsule::from_bytes(&blob.capsule).map_err(|e| corrupt(e.to_string()))?;

        let scheme = Arc::clone(self.keys.scheme());
        let cfrags: Vec<CapsuleFragment> = tokio::task::spawn_blocking(move || {
            fragments
                .iter()
                .map(|kfrag| scheme.transform(&capsule, kfrag))
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| EngineError::TransformFailed {
            key: key.clone(),
            reason: format!("transform task failed: {}", e),
        })?
        .map_err(|e| EngineError::TransformFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        let transformed = TransformedBlob {
            original_content_id: grant.content_id.clone(),
            recipient_id: grant.recipient_id.clone(),
            ciphertext: blob.ciphertext,
            capsule: blob.capsule,
            capsule_fragment: cfrags.iter().flat_map(|c| c.to_bytes()).collect(),
        }
        .to_json_bytes()
        .map_err(|e| EngineError::Invalid(e.to_string()))?;
        let transformed = Bytes::from(transformed);

        let payload = transformed.clone();
        let transformed_id = self
            .bounded("content_put", move || content.put(payload.clone()))
            .await?;

        let registry = &self.registry;
        let recipient_id = &grant.recipient_id;
        let new_id = &transformed_id;
        let completion = self
            .bounded("complete_grant", move || {
                registry.complete_grant(content_id, recipient_id, new_id)
            })
            .await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .store(&grant.content_id, &grant.recipient_id, transformed)
                .await
            {
                warn!(content_id = %grant.content_id, error = %e, "transformed blob not cached");
            }
        }

        Ok(match completion {
            Completion::Completed => GrantOutcome::Transformed(transformed_id),
            Completion::AlreadyCompleted => GrantOutcome::AlreadyTransformed(transformed_id),
        })
    }

    /// Every fragment must be signed by the grant's owner and delegate to the
    /// recipient key recorded on the grant.
    async fn check_delegation(&self, grant: &AccessGrant, fragments: &[KeyFragment]) -> Result<()> {
        let key = grant.key();
        let owner_pk = self
            .keys
            .public_key_of(&grant.owner_id)
            .await
            .map_err(|e| EngineError::FragmentUnavailable {
                key: key.clone(),
                reason: format!("owner key unavailable: {}", e),
            })?;
        let rejected = |reason: String| EngineError::TransformFailed {
            key: key.clone(),
            reason,
        };
        let recipient_pk = PublicKey::from_hex(&grant.recipient_public_key)
            .map_err(|e| rejected(format!("recipient public key: {}", e)))?;

        for fragment in fragments {
            fragment
                .verify_delegation(&owner_pk, &recipient_pk)
                .map_err(|e| rejected(e.to_string()))?;
        }
        Ok(())
    }

    /// Run `op` under the call timeout, retrying once on a transient failure.
    async fn bounded<T, E, F, Fut>(&self, call: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<EngineError>,
    {
        let mut retried = false;
        loop {
            let result = match tokio::time::timeout(self.config.call_timeout, op()).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(EngineError::BackendUnavailable(format!(
                    "{} timed out after {:?}",
                    call, self.config.call_timeout
                ))),
            };

            match result {
                Err(e) if e.is_transient() && !retried => {
                    debug!(call, error = %e, "retrying once");
                    retried = true;
                }
                other => return other,
            }
        }
    }
}
