//! # pregrant Store
//!
//! Registry and content store abstractions for pregrant, with the local
//! backends.
//!
//! ## Overview
//!
//! The engine talks to the source of truth through the [`Registry`] trait
//! and to blobs through [`ContentStore`]. Backends here:
//!
//! - [`JsonFileRegistry`] - Durable local registry, one JSON document
//! - [`MemoryRegistry`] - In-memory registry for tests and mirrors
//! - [`SqliteContentStore`] - Durable content-addressed blob store
//! - [`MemoryContentStore`] - In-memory blob store for tests
//!
//! The ledger-backed registry lives in `pregrant-ledger` and implements the
//! same trait.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pregrant_store::{JsonFileRegistry, Registry};
//!
//! async fn example() {
//!     let registry = JsonFileRegistry::open("data/registry.json").unwrap();
//!     let issued = registry.list_grants(None).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent records**: same id and hash twice returns `AlreadyExists`
//! - **Issue-once grants**: a second grant for the same key is `Conflict`
//! - **Atomic completion**: `complete_grant` is the only mutation of a grant
//!   and the single cross-process mutual-exclusion point
//! - **Mirror reconciliation**: [`mirror::reconcile`] copies an authority into
//!   a local registry and reports divergences

pub mod cache;
pub mod document;
pub mod error;
pub mod fs;
pub mod json;
pub mod memory;
pub mod migration;
pub mod mirror;
pub mod sqlite;
pub mod traits;

pub use cache::TransformedCache;
pub use document::RegistryDocument;
pub use error::{Result, StoreError};
pub use json::JsonFileRegistry;
pub use memory::{MemoryContentStore, MemoryRegistry};
pub use mirror::{reconcile, Divergence, MirrorReport};
pub use sqlite::SqliteContentStore;
pub use traits::{ContentStore, InsertResult, Registry};
