//! Ristretto255 key pairs.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{PreError, Result};
use crate::hashing::base_mul;

/// A secret scalar.
///
/// Zeroized on drop. `Debug` never prints the scalar.
#[derive(Clone)]
pub struct SecretKey(Scalar);

impl SecretKey {
    /// Generate a new random secret key.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self(Scalar::random(&mut rng))
    }

    /// Parse from the 32-byte canonical encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PreError::InvalidKey(format!("secret key is {} bytes", bytes.len())))?;
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(arr))
            .ok_or_else(|| PreError::InvalidKey("non-canonical secret scalar".into()))?;
        if scalar == Scalar::ZERO {
            return Err(PreError::InvalidKey("zero secret scalar".into()));
        }
        Ok(Self(scalar))
    }

    /// The canonical encoding, wiped when the returned buffer drops.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.0.to_bytes())
    }

    /// Derive the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(base_mul(&self.0))
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.0
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A public key: a non-identity Ristretto point.
///
/// Serialized as the hex of its 32-byte compressed form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    point: RistrettoPoint,
    compressed: [u8; 32],
}

impl PublicKey {
    pub(crate) fn from_point(point: RistrettoPoint) -> Self {
        Self {
            point,
            compressed: point.compress().to_bytes(),
        }
    }

    /// Parse from the 32-byte compressed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let compressed = CompressedRistretto::from_slice(bytes)
            .map_err(|_| PreError::InvalidKey(format!("public key is {} bytes", bytes.len())))?;
        let point = compressed
            .decompress()
            .ok_or_else(|| PreError::InvalidKey("not a ristretto point".into()))?;
        if point.is_identity() {
            return Err(PreError::InvalidKey("identity public key".into()));
        }
        Ok(Self::from_point(point))
    }

    /// Get the compressed bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.compressed
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.compressed)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| PreError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn point(&self) -> RistrettoPoint {
        self.point
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        pregrant_core::hex_serde::serialize(self.compressed, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes: [u8; 32] = pregrant_core::hex_serde::deserialize_array(deserializer)?;
        Self::from_bytes(&bytes).map_err(de::Error::custom)
    }
}
