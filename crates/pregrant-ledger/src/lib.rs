//! # pregrant Ledger
//!
//! Ledger-backed registry for pregrant.
//!
//! ## Overview
//!
//! The access-control contract keeps records and grants on a shared ledger
//! so that owner, proxy and recipients agree on grant state without trusting
//! one another's disks. This crate provides:
//!
//! - [`contract`] - Calls, signed transactions, events and the contract rules
//! - [`LedgerClient`] - Submission, contract reads and the event log
//! - [`client::memory::MemoryLedger`] - In-process ledger for tests and local runs
//! - [`LedgerRegistry`] - The `pregrant_store::Registry` implementation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pregrant_core::Keypair;
//! use pregrant_ledger::{client::memory::MemoryLedger, LedgerRegistry};
//! use pregrant_store::Registry;
//!
//! async fn example() {
//!     let ledger = Arc::new(MemoryLedger::new());
//!     let registry = LedgerRegistry::new(ledger, Keypair::generate());
//!     let pending = registry.list_grants(None).await.unwrap();
//! }
//! ```
//!
//! ## Contract Rules
//!
//! - **Register once**: a content id is registered by exactly one account
//! - **Owner grants**: only the registrant may grant, and only for an existing record
//! - **Complete once**: any account may complete a grant, the first one wins
//! - **Nonces**: refused transactions keep the nonce, reverted ones consume it

pub mod client;
pub mod contract;
pub mod error;
pub mod registry;

pub use client::LedgerClient;
pub use contract::{
    ContractState, EventLog, LedgerCall, LedgerEvent, RevertReason, SignedTransaction,
    Transaction, TxReceipt,
};
pub use error::{LedgerError, Result};
pub use registry::LedgerRegistry;
