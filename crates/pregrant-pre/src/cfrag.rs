//! Capsule fragments: the proxy's output for one key fragment.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use std::collections::HashSet;

use crate::capsule::Capsule;
use crate::error::{PreError, Result};
use crate::hashing::{delegation_secret, share_index};
use crate::keys::{PublicKey, SecretKey};
use crate::kfrag::KeyFragment;

/// Encoded capsule fragment length in bytes.
pub const CFRAG_LEN: usize = 192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleFragment {
    pub(crate) e1: RistrettoPoint,
    pub(crate) v1: RistrettoPoint,
    pub(crate) id: [u8; 32],
    pub(crate) precursor: RistrettoPoint,
    pub(crate) delegating_pk: PublicKey,
    pub(crate) receiving_pk: PublicKey,
}

impl CapsuleFragment {
    /// Re-encrypt a capsule under one key fragment.
    ///
    /// Deterministic: equal inputs always yield equal fragments.
    pub(crate) fn reencrypt(capsule: &Capsule, kfrag: &KeyFragment) -> Self {
        Self {
            e1: kfrag.rk * capsule.e,
            v1: kfrag.rk * capsule.v,
            id: kfrag.id,
            precursor: kfrag.precursor,
            delegating_pk: kfrag.delegating_pk,
            receiving_pk: kfrag.receiving_pk,
        }
    }

    pub fn to_bytes(&self) -> [u8; CFRAG_LEN] {
        let mut out = [0u8; CFRAG_LEN];
        out[..32].copy_from_slice(self.e1.compress().as_bytes());
        out[32..64].copy_from_slice(self.v1.compress().as_bytes());
        out[64..96].copy_from_slice(&self.id);
        out[96..128].copy_from_slice(self.precursor.compress().as_bytes());
        out[128..160].copy_from_slice(self.delegating_pk.as_bytes());
        out[160..].copy_from_slice(self.receiving_pk.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CFRAG_LEN {
            return Err(PreError::Serialization(format!(
                "capsule fragment must be {} bytes, got {}",
                CFRAG_LEN,
                bytes.len()
            )));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes[64..96]);

        Ok(Self {
            e1: point(&bytes[..32])?,
            v1: point(&bytes[32..64])?,
            id,
            precursor: point(&bytes[96..128])?,
            delegating_pk: PublicKey::from_bytes(&bytes[128..160])?,
            receiving_pk: PublicKey::from_bytes(&bytes[160..])?,
        })
    }
}

/// Combine capsule fragments into the capsule's shared point.
///
/// All fragments must come from one delegation `delegating -> receiving`.
pub(crate) fn open_reencrypted(
    receiving: &SecretKey,
    delegating_pk: &PublicKey,
    cfrags: &[CapsuleFragment],
) -> Result<RistrettoPoint> {
    let first = cfrags
        .first()
        .ok_or(PreError::InsufficientFragments { needed: 1, got: 0 })?;
    let receiving_pk = receiving.public_key();

    let mut ids = HashSet::with_capacity(cfrags.len());
    for cfrag in cfrags {
        if cfrag.delegating_pk != *delegating_pk {
            return Err(PreError::MismatchedFragments(
                "fragment was issued by a different owner".into(),
            ));
        }
        if cfrag.receiving_pk != receiving_pk {
            return Err(PreError::MismatchedFragments(
                "fragment delegates to a different recipient".into(),
            ));
        }
        if cfrag.precursor != first.precursor {
            return Err(PreError::MismatchedFragments(
                "fragments come from different delegations".into(),
            ));
        }
        if !ids.insert(cfrag.id) {
            return Err(PreError::MismatchedFragments("duplicate fragment".into()));
        }
    }

    let dh = receiving.scalar() * first.precursor;
    let d = delegation_secret(&first.precursor, receiving_pk.as_bytes(), &dh);
    let xs: Vec<Scalar> = cfrags.iter().map(|c| share_index(&c.id, &d)).collect();

    let mut combined = RistrettoPoint::identity();
    for (i, cfrag) in cfrags.iter().enumerate() {
        let lambda = lagrange_at_zero(&xs, i);
        combined += lambda * (cfrag.e1 + cfrag.v1);
    }

    Ok(d * combined)
}

/// Lagrange basis coefficient for `xs[i]` evaluated at zero.
fn lagrange_at_zero(xs: &[Scalar], i: usize) -> Scalar {
    let xi = xs[i];
    xs.iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .fold(Scalar::ONE, |acc, (_, xj)| acc * xj * (xj - xi).invert())
}

fn point(bytes: &[u8]) -> Result<RistrettoPoint> {
    CompressedRistretto::from_slice(bytes)
        .ok()
        .and_then(|c| c.decompress())
        .ok_or_else(|| PreError::Serialization("bad point encoding".into()))
}
