//! Strong type definitions for pregrant.
//!
//! All identifiers are newtypes to prevent mixing a content id with a
//! principal id at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Blake3Hash;

/// Prefix for content ids derived from blob bytes.
pub const CONTENT_ID_PREFIX: &str = "b3-";

/// Domain separation context for grant id derivation.
const GRANT_ID_CONTEXT: &str = "pregrant-v1 grant id";
const PRINCIPAL_FILE_CONTEXT: &str = "pregrant-v1 principal file";

/// Directory component of fragment references.
const FRAGMENT_REF_PREFIX: &str = "fragments/";

/// Handle into the content store.
///
/// Opaque to the engine; stores derive it from the bytes they hold.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the content address for a blob.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!(
            "{}{}",
            CONTENT_ID_PREFIX,
            Blake3Hash::hash(bytes).to_hex()
        ))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A short prefix suitable for file names and log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(16)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of an owner or recipient.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Wrap an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identity is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A file name component unique to this identity.
    ///
    /// Hex of a BLAKE3 derived key, so distinct identities never share a
    /// file and no identity can name a path outside its directory.
    pub fn file_stem(&self) -> String {
        hex::encode(blake3::derive_key(PRINCIPAL_FILE_CONTEXT, self.0.as_bytes()))
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId({})", self.0)
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The unique key of an access grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    pub content_id: ContentId,
    pub recipient_id: PrincipalId,
}

impl GrantKey {
    /// Create a grant key.
    pub fn new(content_id: ContentId, recipient_id: PrincipalId) -> Self {
        Self {
            content_id,
            recipient_id,
        }
    }

    /// Derive the deterministic grant identifier.
    ///
    /// Fields are length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
    pub fn grant_id(&self) -> GrantId {
        let mut hasher = blake3::Hasher::new_derive_key(GRANT_ID_CONTEXT);
        for field in [self.content_id.as_str(), self.recipient_id.as_str()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        GrantId(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.content_id, self.recipient_id)
    }
}

/// A 32-byte grant identifier, derived from a [`GrantKey`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantId(pub [u8; 32]);

impl GrantId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GrantId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Opaque locator for a stored key fragment set.
///
/// Never contains fragment bytes, only where to find them.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentRef(String);

impl FragmentRef {
    /// The canonical reference for a grant's fragment set.
    pub fn for_grant(grant_id: &GrantId) -> Self {
        Self(format!("{}{}", FRAGMENT_REF_PREFIX, grant_id.to_hex()))
    }

    /// Wrap a raw reference string (e.g. read back from a registry).
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The grant id this reference names, if it is well formed.
    pub fn grant_id(&self) -> Option<GrantId> {
        self.0
            .strip_prefix(FRAGMENT_REF_PREFIX)
            .and_then(|hex| GrantId::from_hex(hex).ok())
    }
}

impl fmt::Debug for FragmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FragmentRef({})", self.0)
    }
}

impl fmt::Display for FragmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
