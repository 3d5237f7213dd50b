//! # pregrant Core
//!
//! Pure data model for the delegated-access engine: content identifiers,
//! data records, access grants and the blob formats exchanged through the
//! content store.
//!
//! This crate contains no I/O, no storage, no networking. Every backend and
//! workflow crate builds on these types so that the grant lifecycle rules
//! live in exactly one place.
//!
//! ## Key Types
//!
//! - [`DataRecord`] - Provenance of one encrypted artifact
//! - [`AccessGrant`] - A delegation from an owner to one recipient
//! - [`GrantState`] - `Issued` or `Transformed` (terminal)
//! - [`GrantKey`] / [`GrantId`] - Identity of a grant, `(content_id, recipient_id)`
//! - [`EncryptedBlob`] / [`TransformedBlob`] - JSON documents stored in the content store
//!
//! ## Lifecycle
//!
//! A grant is created `Issued` and moves to `Transformed` exactly once via
//! [`AccessGrant::complete`]. Completing again with the same transformed id is
//! an idempotent no-op; completing with a different id is an error.

pub mod blob;
pub mod crypto;
pub mod error;
pub mod hex_serde;
pub mod record;
pub mod types;
pub mod validation;

pub use blob::{EncryptedBlob, TransformedBlob};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use record::{now_millis, AccessGrant, Completion, DataRecord, GrantState};
pub use types::{ContentId, FragmentRef, GrantId, GrantKey, PrincipalId};
pub use validation::{validate_grant, validate_record};
