//! Ledger client abstraction.
//!
//! A client submits signed transactions, answers read-only contract calls
//! and serves the event log. Implementations may speak to a remote node over
//! any RPC; [`memory::MemoryLedger`] runs the contract in-process.

use async_trait::async_trait;
use pregrant_core::{AccessGrant, ContentId, DataRecord, Ed25519PublicKey, GrantId};

use crate::contract::{EventLog, SignedTransaction, TxReceipt};
use crate::error::Result;

/// Client for one deployed access-control contract.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed transaction and wait for inclusion.
    ///
    /// Refused transactions are `Rejected` and do not consume the nonce.
    /// Included transactions that revert are `Reverted`.
    async fn submit(&self, tx: SignedTransaction) -> Result<TxReceipt>;

    /// Next nonce the ledger expects from `account`.
    async fn next_nonce(&self, account: &Ed25519PublicKey) -> Result<u64>;

    /// Read a record by content id.
    async fn call_record(&self, content_id: &ContentId) -> Result<Option<DataRecord>>;

    /// Read the current state of a grant.
    async fn call_grant(&self, grant_id: &GrantId) -> Result<Option<AccessGrant>>;

    /// Events from `from_block` (inclusive) onward, in block order.
    async fn events(&self, from_block: u64) -> Result<Vec<EventLog>>;

    /// Height of the latest block.
    async fn block_number(&self) -> Result<u64>;
}

/// An in-process ledger for tests and local runs.
///
/// Every accepted transaction is mined into its own block.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;
    use tracing::debug;

    use crate::contract::ContractState;
    use crate::error::LedgerError;

    #[derive(Default)]
    struct Chain {
        state: ContractState,
        logs: Vec<EventLog>,
        height: u64,
    }

    /// In-memory ledger.
    pub struct MemoryLedger {
        chain: RwLock<Chain>,
        available: AtomicBool,
    }

    impl MemoryLedger {
        pub fn new() -> Self {
            Self {
                chain: RwLock::new(Chain::default()),
                available: AtomicBool::new(true),
            }
        }

        /// Simulate the node going away (`false`) or coming back (`true`).
        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        fn ensure_available(&self) -> Result<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(LedgerError::Unavailable("memory ledger offline".into()))
            }
        }
    }

    impl Default for MemoryLedger {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl LedgerClient for MemoryLedger {
        async fn submit(&self, tx: SignedTransaction) -> Result<TxReceipt> {
            self.ensure_available()?;
            let tx_hash = tx.tx_hash()?;
            let mut chain = self.chain.write().await;

            chain.state.admit(&tx).map_err(LedgerError::Rejected)?;
            chain.state.bump_nonce(&tx.tx.sender);
            chain.height += 1;
            let block_number = chain.height;

            let method = tx.tx.call.method();
            let outcome = chain.state.apply(&tx.tx.sender, tx.tx.call);
            match outcome {
                Ok(event) => {
                    chain.logs.push(EventLog {
                        block_number,
                        tx_hash,
                        event,
                    });
                    debug!(method, block_number, "transaction included");
                    Ok(TxReceipt {
                        tx_hash,
                        block_number,
                    })
                }
                Err(reason) => {
                    debug!(method, block_number, %reason, "transaction reverted");
                    Err(LedgerError::Reverted { tx_hash, reason })
                }
            }
        }

        async fn next_nonce(&self, account: &Ed25519PublicKey) -> Result<u64> {
            self.ensure_available()?;
            Ok(self.chain.read().await.state.nonce(account))
        }

        async fn call_record(&self, content_id: &ContentId) -> Result<Option<DataRecord>> {
            self.ensure_available()?;
            Ok(self.chain.read().await.state.record(content_id).cloned())
        }

        async fn call_grant(&self, grant_id: &GrantId) -> Result<Option<AccessGrant>> {
            self.ensure_available()?;
            Ok(self.chain.read().await.state.grant(grant_id).cloned())
        }

        async fn events(&self, from_block: u64) -> Result<Vec<EventLog>> {
            self.ensure_available()?;
            Ok(self
                .chain
                .read()
                .await
                .logs
                .iter()
                .filter(|log| log.block_number >= from_block)
                .cloned()
                .collect())
        }

        async fn block_number(&self) -> Result<u64> {
            self.ensure_available()?;
            Ok(self.chain.read().await.height)
        }
    }
}
