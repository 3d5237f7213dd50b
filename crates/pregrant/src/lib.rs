//! # pregrant
//!
//! Delegated access control for encrypted data through proxy re-encryption.
//!
//! ## Overview
//!
//! An owner encrypts a payload once and publishes it. To share it the owner
//! issues a grant to a named recipient; an untrusted proxy transforms the capsule
//! with the grant's key fragments, and only that recipient can decrypt the
//! result. This crate wires the workflows together:
//!
//! - [`Owner`] - Produce records, issue grants, verify and decrypt owned data
//! - [`ProxyWorker`] - Transform every issued grant exactly once
//! - [`Recipient`] - List granted access and decrypt transformed blobs
//! - [`KeyMaterialManager`] - Key pairs per identity and fragments per grant
//! - [`Engine`] - Explicit construction of all of the above over shared backends
//!
//! ## Grant Lifecycle
//!
//! ```text
//! Owner::grant ──► Issued ──ProxyWorker──► Transformed ──► Recipient::decrypt
//! ```
//!
//! `Issued -> Transformed` happens only through the registry's atomic
//! `complete_grant`, which is also the only point of mutual exclusion
//! between proxy processes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pregrant::{Engine, EngineConfig};
//!
//! async fn example() {
//!     let engine = Engine::open_local(EngineConfig::with_data_dir("data")).await.unwrap();
//!
//!     let owner = engine.owner("alice").await.unwrap();
//!     let recipient = engine.recipient("R1").await.unwrap();
//!
//!     let record = owner.produce(b"{\"temp\": 21.5}", "sensor-1").await.unwrap();
//!     owner.grant(&record.content_id, recipient.id()).await.unwrap();
//!
//!     engine.worker().run_once().await.unwrap();
//!     let plaintext = recipient.decrypt(&record.content_id).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `pregrant::core` - Records, grants, identifiers
//! - `pregrant::pre` - The proxy re-encryption scheme
//! - `pregrant::store` - Registry and content store traits and local backends
//! - `pregrant::ledger` - Ledger-backed registry

pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod owner;
pub mod recipient;
pub mod worker;

// Re-export component crates
pub use pregrant_core as core;
pub use pregrant_ledger as ledger;
pub use pregrant_pre as pre;
pub use pregrant_store as store;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use keys::{KeyMaterial, KeyMaterialManager};
pub use owner::Owner;
pub use recipient::Recipient;
pub use worker::{GrantOutcome, PassReport, ProxyWorker, WorkerConfig};

pub use pregrant_core::{AccessGrant, ContentId, DataRecord, GrantKey, GrantState, PrincipalId};
