//! [`Registry`] backed by the access-control contract.
//!
//! Writes become signed transactions from this handle's account; reads use
//! direct contract calls for single lookups and replay the event log for
//! listings. Nonces are fetched fresh for every transaction and a single
//! `BadNonce` rejection is retried, which covers another handle sharing the
//! same account.

use std::sync::Arc;

use async_trait::async_trait;
use pregrant_core::{
    AccessGrant, Completion, ContentId, DataRecord, GrantId, GrantKey, Keypair, PrincipalId,
};
use pregrant_store::{InsertResult, Registry, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::LedgerClient;
use crate::contract::{LedgerCall, LedgerEvent, RevertReason, SignedTransaction, TxReceipt};
use crate::error::{LedgerError, Result as LedgerResult};

/// A registry whose source of truth is the ledger.
pub struct LedgerRegistry<C> {
    client: Arc<C>,
    signer: Keypair,
    start_block: u64,
    submit_lock: Mutex<()>,
}

impl<C: LedgerClient> LedgerRegistry<C> {
    /// Create a registry that signs with `signer` and replays from block 0.
    pub fn new(client: Arc<C>, signer: Keypair) -> Self {
        Self {
            client,
            signer,
            start_block: 0,
            submit_lock: Mutex::new(()),
        }
    }

    /// Replay events from `block` instead of genesis, usually the contract's
    /// deployment block.
    pub fn with_start_block(mut self, block: u64) -> Self {
        self.start_block = block;
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Sign and submit one call, retrying once on a stale nonce.
    async fn send(&self, call: LedgerCall) -> LedgerResult<TxReceipt> {
        let _guard = self.submit_lock.lock().await;
        let account = self.signer.public_key();
        let method = call.method();

        let mut retried = false;
        loop {
            let nonce = self.client.next_nonce(&account).await?;
            let tx = SignedTransaction::sign(&self.signer, nonce, call.clone())?;
            match self.client.submit(tx).await {
                Ok(receipt) => {
                    debug!(method, block_number = receipt.block_number, "ledger call included");
                    return Ok(receipt);
                }
                Err(LedgerError::Rejected(RevertReason::BadNonce { expected, got }))
                    if !retried =>
                {
                    debug!(method, expected, got, "stale nonce, retrying");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replay the event log into current grant states, in issue order.
    async fn replay_grants(&self) -> LedgerResult<Vec<AccessGrant>> {
        let mut order: Vec<GrantId> = Vec::new();
        let mut grants: std::collections::HashMap<GrantId, AccessGrant> =
            std::collections::HashMap::new();

        for log in self.client.events(self.start_block).await? {
            match log.event {
                LedgerEvent::AccessGranted { grant_id, grant } => {
                    if grants.insert(grant_id, grant).is_none() {
                        order.push(grant_id);
                    }
                }
                LedgerEvent::AccessCompleted {
                    grant_id,
                    transformed_content_id,
                    ..
                } => {
                    if let Some(grant) = grants.get_mut(&grant_id) {
                        grant.complete(transformed_content_id)?;
                    }
                }
                LedgerEvent::DataRegistered { .. } => {}
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|id| grants.remove(&id))
            .collect())
    }
}

/// Decide a completion against the transformed id the ledger already holds.
fn settled_completion(
    content_id: &ContentId,
    recipient_id: &PrincipalId,
    existing: ContentId,
    attempted: &ContentId,
) -> pregrant_store::Result<Completion> {
    if existing == *attempted {
        Ok(Completion::AlreadyCompleted)
    } else {
        Err(StoreError::AlreadyTransformed {
            content_id: content_id.clone(),
            recipient_id: recipient_id.clone(),
            existing,
            attempted: attempted.clone(),
        })
    }
}

#[async_trait]
impl<C: LedgerClient + 'static> Registry for LedgerRegistry<C> {
    async fn put_record(&self, record: &DataRecord) -> pregrant_store::Result<InsertResult> {
        if let Some(existing) = self.client.call_record(&record.content_id).await? {
            return if existing.content_hash == record.content_hash {
                Ok(InsertResult::AlreadyExists)
            } else {
                Err(StoreError::Conflict(format!(
                    "record {} registered with a different hash",
                    record.content_id
                )))
            };
        }

        let call = LedgerCall::RegisterData {
            record: record.clone(),
        };
        match self.send(call).await {
            Ok(receipt) => {
                info!(content_id = %record.content_id, block_number = receipt.block_number, "data registered on ledger");
                Ok(InsertResult::Inserted)
            }
            Err(LedgerError::Reverted {
                reason: RevertReason::RecordExists { existing_hash },
                ..
            }) if existing_hash == record.content_hash => Ok(InsertResult::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_record(&self, content_id: &ContentId) -> pregrant_store::Result<Option<DataRecord>> {
        Ok(self.client.call_record(content_id).await?)
    }

    async fn list_records(&self) -> pregrant_store::Result<Vec<DataRecord>> {
        let logs = self.client.events(self.start_block).await?;
        Ok(logs
            .into_iter()
            .filter_map(|log| match log.event {
                LedgerEvent::DataRegistered { record, .. } => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn put_grant(&self, grant: &AccessGrant) -> pregrant_store::Result<()> {
        let receipt = self
            .send(LedgerCall::GrantAccess {
                grant: grant.clone(),
            })
            .await?;
        info!(
            content_id = %grant.content_id,
            recipient_id = %grant.recipient_id,
            block_number = receipt.block_number,
            "access granted on ledger"
        );
        Ok(())
    }

    async fn get_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
    ) -> pregrant_store::Result<Option<AccessGrant>> {
        let grant_id = GrantKey::new(content_id.clone(), recipient_id.clone()).grant_id();
        Ok(self.client.call_grant(&grant_id).await?)
    }

    async fn list_grants(
        &self,
        content_id: Option<&ContentId>,
    ) -> pregrant_store::Result<Vec<AccessGrant>> {
        let grants = self.replay_grants().await?;
        Ok(match content_id {
            Some(id) => grants.into_iter().filter(|g| g.content_id == *id).collect(),
            None => grants,
        })
    }

    async fn complete_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        transformed_content_id: &ContentId,
    ) -> pregrant_store::Result<Completion> {
        if transformed_content_id.is_empty() {
            return Err(StoreError::InvalidData(
                "transformed_content_id must not be empty".into(),
            ));
        }

        let grant_id = GrantKey::new(content_id.clone(), recipient_id.clone()).grant_id();
        let current = self
            .client
            .call_grant(&grant_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("grant ({}, {})", content_id, recipient_id)))?;
        if let Some(existing) = current.transformed_content_id {
            return settled_completion(content_id, recipient_id, existing, transformed_content_id);
        }

        let call = LedgerCall::CompleteAccess {
            grant_id,
            transformed_content_id: transformed_content_id.clone(),
        };
        match self.send(call).await {
            Ok(receipt) => {
                info!(
                    content_id = %content_id,
                    recipient_id = %recipient_id,
                    transformed_content_id = %transformed_content_id,
                    block_number = receipt.block_number,
                    "access completed on ledger"
                );
                Ok(Completion::Completed)
            }
            Err(LedgerError::Reverted {
                reason: RevertReason::AlreadyProcessed { existing },
                ..
            }) => settled_completion(content_id, recipient_id, existing, transformed_content_id),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "ledger"
    }
}
