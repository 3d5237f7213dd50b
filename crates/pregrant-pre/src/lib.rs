//! # pregrant PRE
//!
//! Threshold proxy re-encryption over Ristretto255.
//!
//! ## Overview
//!
//! An owner encrypts once under the owner's public key. To delegate, the
//! owner derives key fragments for a recipient's public key and hands them to
//! a proxy. The proxy transforms the capsule with a fragment and learns
//! nothing; the recipient combines capsule fragments with the recipient's
//! secret key to recover the plaintext.
//!
//! ## Key Types
//!
//! - [`PreScheme`] - The capability interface the engine consumes
//! - [`RistrettoPre`] - The one implementation
//! - [`Capsule`] - Encapsulation header travelling with the ciphertext
//! - [`KeyFragment`] - Owner-signed share of a re-encryption key
//! - [`CapsuleFragment`] - Proxy output, combined by the recipient
//!
//! ## Properties
//!
//! - `transform` is deterministic in `(capsule, fragment)`.
//! - Fragments carry an owner signature; `transform` rejects tampered ones.
//! - Secret keys are zeroized on drop and never appear in `Debug` output.
//!
//! ```rust
//! use pregrant_pre::{PreScheme, RistrettoPre};
//!
//! let pre = RistrettoPre::new();
//! let (owner_sk, owner_pk) = pre.generate_keypair();
//! let (recipient_sk, recipient_pk) = pre.generate_keypair();
//!
//! let (capsule, ciphertext) = pre.encrypt(&owner_pk, b"{\"temp\": 21.5}").unwrap();
//! let kfrags = pre.derive_fragments(&owner_sk, &recipient_pk, 1, 1).unwrap();
//! let cfrag = pre.transform(&capsule, &kfrags[0]).unwrap();
//!
//! let plaintext = pre
//!     .combine_and_decrypt(&recipient_sk, &owner_pk, &capsule, &[cfrag], &ciphertext)
//!     .unwrap();
//! assert_eq!(plaintext, b"{\"temp\": 21.5}");
//! ```

pub mod capsule;
pub mod cfrag;
mod dem;
pub mod error;
mod hashing;
pub mod keys;
pub mod kfrag;
pub mod scheme;

pub use capsule::{Capsule, CAPSULE_LEN};
pub use cfrag::{CapsuleFragment, CFRAG_LEN};
pub use error::{PreError, Result};
pub use keys::{PublicKey, SecretKey};
pub use kfrag::{KeyFragment, KFRAG_LEN};
pub use scheme::{PreScheme, RistrettoPre};
