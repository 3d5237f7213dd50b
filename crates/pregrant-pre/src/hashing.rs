//! Domain-separated hashing onto the scalar field.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

pub(crate) const CAPSULE_CONTEXT: &str = "pregrant-pre-v1 capsule challenge";
pub(crate) const DELEGATION_CONTEXT: &str = "pregrant-pre-v1 delegation secret";
pub(crate) const SHARE_INDEX_CONTEXT: &str = "pregrant-pre-v1 share index";
pub(crate) const SIGNATURE_CONTEXT: &str = "pregrant-pre-v1 kfrag signature";
pub(crate) const DEM_CONTEXT: &str = "pregrant-pre-v1 dem key";

/// `s * G`.
pub(crate) fn base_mul(s: &Scalar) -> RistrettoPoint {
    s * RISTRETTO_BASEPOINT_POINT
}

/// Incremental hash whose output is reduced into a scalar.
///
/// Every input is length-prefixed so concatenation is unambiguous.
pub(crate) struct ScalarHasher(blake3::Hasher);

impl ScalarHasher {
    pub(crate) fn new(context: &str) -> Self {
        Self(blake3::Hasher::new_derive_key(context))
    }

    pub(crate) fn chain(mut self, bytes: &[u8]) -> Self {
        self.0.update(&(bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    pub(crate) fn chain_point(self, point: &RistrettoPoint) -> Self {
        self.chain(point.compress().as_bytes())
    }

    /// 64 bytes of XOF output, reduced mod the group order.
    pub(crate) fn finalize(self) -> Scalar {
        let mut wide = [0u8; 64];
        self.0.finalize_xof().fill(&mut wide);
        Scalar::from_bytes_mod_order_wide(&wide)
    }
}

/// Shared delegation secret `d = H(X, B, x·B)`.
///
/// The owner computes it with the precursor secret `x`, the recipient with
/// `b·X`; both land on the same point.
pub(crate) fn delegation_secret(
    precursor: &RistrettoPoint,
    receiving_pk: &[u8; 32],
    dh_point: &RistrettoPoint,
) -> Scalar {
    ScalarHasher::new(DELEGATION_CONTEXT)
        .chain_point(precursor)
        .chain(receiving_pk)
        .chain_point(dh_point)
        .finalize()
}

/// Evaluation point of a share, bound to the delegation secret.
pub(crate) fn share_index(id: &[u8; 32], delegation: &Scalar) -> Scalar {
    ScalarHasher::new(SHARE_INDEX_CONTEXT)
        .chain(id)
        .chain(delegation.as_bytes())
        .finalize()
}
