//! Capsules: the key encapsulation header that travels with a ciphertext.
//!
//! A capsule `(E, V, s)` commits to a shared point `(r + u)·A` for owner key
//! `A`, with `E = r·G`, `V = u·G` and `s = u + r·H(E, V)`. Anyone can check
//! `s·G == V + H(E, V)·E`; only the owner (or a recipient holding enough
//! capsule fragments) can recover the shared point.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

use crate::error::{PreError, Result};
use crate::hashing::{base_mul, ScalarHasher, CAPSULE_CONTEXT};
use crate::keys::{PublicKey, SecretKey};

/// Encoded capsule length in bytes.
pub const CAPSULE_LEN: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capsule {
    pub(crate) e: RistrettoPoint,
    pub(crate) v: RistrettoPoint,
    pub(crate) s: Scalar,
}

fn challenge(e: &RistrettoPoint, v: &RistrettoPoint) -> Scalar {
    ScalarHasher::new(CAPSULE_CONTEXT)
        .chain_point(e)
        .chain_point(v)
        .finalize()
}

impl Capsule {
    /// Create a capsule for `owner` and return it with the shared point.
    pub(crate) fn encapsulate(owner: &PublicKey) -> (Self, RistrettoPoint) {
        let mut rng = rand::thread_rng();
        let r = Scalar::random(&mut rng);
        let u = Scalar::random(&mut rng);

        let e = base_mul(&r);
        let v = base_mul(&u);
        let s = u + r * challenge(&e, &v);

        let shared = (r + u) * owner.point();
        (Self { e, v, s }, shared)
    }

    /// Check the capsule's self-consistency proof.
    pub fn verify(&self) -> bool {
        base_mul(&self.s) == self.v + challenge(&self.e, &self.v) * self.e
    }

    /// Recover the shared point with the owner's secret key.
    pub(crate) fn open_original(&self, owner: &SecretKey) -> RistrettoPoint {
        owner.scalar() * (self.e + self.v)
    }

    /// Encode as `E || V || s`.
    pub fn to_bytes(&self) -> [u8; CAPSULE_LEN] {
        let mut out = [0u8; CAPSULE_LEN];
        out[..32].copy_from_slice(self.e.compress().as_bytes());
        out[32..64].copy_from_slice(self.v.compress().as_bytes());
        out[64..].copy_from_slice(self.s.as_bytes());
        out
    }

    /// Decode and verify.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CAPSULE_LEN {
            return Err(PreError::InvalidCapsule(format!(
                "expected {} bytes, got {}",
                CAPSULE_LEN,
                bytes.len()
            )));
        }
        let e = decode_point(&bytes[..32])?;
        let v = decode_point(&bytes[32..64])?;
        let s = decode_scalar(&bytes[64..])?;

        let capsule = Self { e, v, s };
        if !capsule.verify() {
            return Err(PreError::InvalidCapsule("proof does not verify".into()));
        }
        Ok(capsule)
    }
}

fn decode_point(bytes: &[u8]) -> Result<RistrettoPoint> {
    CompressedRistretto::from_slice(bytes)
        .ok()
        .and_then(|c| c.decompress())
        .ok_or_else(|| PreError::InvalidCapsule("bad point encoding".into()))
}

fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| PreError::InvalidCapsule("bad scalar length".into()))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(arr))
        .ok_or_else(|| PreError::InvalidCapsule("non-canonical scalar".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_recovers_shared_point() {
        let sk = SecretKey::random();
        let (capsule, shared) = Capsule::encapsulate(&sk.public_key());
        assert!(capsule.verify());
        assert_eq!(capsule.open_original(&sk), shared);
    }

    #[test]
    fn test_capsule_bytes_roundtrip() {
        let sk = SecretKey::random();
        let (capsule, _) = Capsule::encapsulate(&sk.public_key());
        let restored = Capsule::from_bytes(&capsule.to_bytes()).unwrap();
        assert_eq!(restored, capsule);
    }

    #[test]
    fn test_tampered_capsule_rejected() {
        let sk = SecretKey::random();
        let (mut capsule, _) = Capsule::encapsulate(&sk.public_key());
        capsule.s += Scalar::ONE;
        assert!(!capsule.verify());
        assert!(Capsule::from_bytes(&capsule.to_bytes()).is_err());
        assert!(Capsule::from_bytes(&[0u8; 10]).is_err());
    }
}
