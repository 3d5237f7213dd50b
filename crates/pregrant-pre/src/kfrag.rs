//! Key fragments: signed shares of a re-encryption key.
//!
//! For owner key `a` and recipient key `B`, the owner picks a precursor
//! `X = x·G`, derives the delegation secret `d = H(X, B, x·B)` and splits
//! `a·d⁻¹` with a degree `threshold - 1` polynomial. Each share is evaluated
//! at a point derived from a random id and `d`, so only the recipient can
//! reconstruct the evaluation points. Every fragment is Schnorr-signed by the
//! owner over its id, `rk·G`, the precursor and both public keys.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::Zeroize;

use crate::error::{PreError, Result};
use crate::hashing::{base_mul, delegation_secret, share_index, ScalarHasher, SIGNATURE_CONTEXT};
use crate::keys::{PublicKey, SecretKey};

/// Encoded key fragment length in bytes.
pub const KFRAG_LEN: usize = 224;

#[derive(Clone, PartialEq, Eq)]
pub struct KeyFragment {
    pub(crate) id: [u8; 32],
    pub(crate) rk: Scalar,
    pub(crate) precursor: RistrettoPoint,
    pub(crate) delegating_pk: PublicKey,
    pub(crate) receiving_pk: PublicKey,
    pub(crate) sig_r: RistrettoPoint,
    pub(crate) sig_z: Scalar,
}

impl KeyFragment {
    /// Derive `shares` fragments, any `threshold` of which suffice.
    pub(crate) fn generate(
        delegating: &SecretKey,
        receiving: &PublicKey,
        threshold: usize,
        shares: usize,
    ) -> Result<Vec<Self>> {
        if threshold == 0 || threshold > shares {
            return Err(PreError::InvalidThreshold { threshold, shares });
        }

        let mut rng = rand::thread_rng();
        let delegating_pk = delegating.public_key();

        let mut x = Scalar::random(&mut rng);
        let precursor = base_mul(&x);
        let d = delegation_secret(&precursor, receiving.as_bytes(), &(x * receiving.point()));
        x.zeroize();

        let mut coefficients = Vec::with_capacity(threshold);
        coefficients.push(delegating.scalar() * d.invert());
        for _ in 1..threshold {
            coefficients.push(Scalar::random(&mut rng));
        }

        let mut fragments = Vec::with_capacity(shares);
        for _ in 0..shares {
            let mut id = [0u8; 32];
            rng.fill_bytes(&mut id);
            let rk = evaluate(&coefficients, &share_index(&id, &d));

            let message = signed_message(&id, &base_mul(&rk), &precursor, &delegating_pk, receiving);
            let (sig_r, sig_z) = sign(delegating, &delegating_pk, &message, &mut rng);

            fragments.push(Self {
                id,
                rk,
                precursor,
                delegating_pk,
                receiving_pk: *receiving,
                sig_r,
                sig_z,
            });
        }
        coefficients.zeroize();

        Ok(fragments)
    }

    /// Verify the owner's signature over this fragment.
    pub fn verify(&self) -> Result<()> {
        let message = signed_message(
            &self.id,
            &base_mul(&self.rk),
            &self.precursor,
            &self.delegating_pk,
            &self.receiving_pk,
        );
        let c = signature_challenge(&self.sig_r, &self.delegating_pk, &message);
        if base_mul(&self.sig_z) == self.sig_r + c * self.delegating_pk.point() {
            Ok(())
        } else {
            Err(PreError::FragmentVerification(
                "owner signature does not verify".into(),
            ))
        }
    }

    /// Verify the signature and that this fragment delegates from `owner`
    /// to `recipient`.
    pub fn verify_delegation(&self, owner: &PublicKey, recipient: &PublicKey) -> Result<()> {
        if self.delegating_pk != *owner {
            return Err(PreError::FragmentVerification(
                "fragment issued by a different owner".into(),
            ));
        }
        if self.receiving_pk != *recipient {
            return Err(PreError::FragmentVerification(
                "fragment delegates to a different recipient".into(),
            ));
        }
        self.verify()
    }

    /// The owner that issued this fragment.
    pub fn delegating_pk(&self) -> &PublicKey {
        &self.delegating_pk
    }

    /// The recipient this fragment delegates to.
    pub fn receiving_pk(&self) -> &PublicKey {
        &self.receiving_pk
    }

    pub fn to_bytes(&self) -> [u8; KFRAG_LEN] {
        let mut out = [0u8; KFRAG_LEN];
        out[..32].copy_from_slice(&self.id);
        out[32..64].copy_from_slice(self.rk.as_bytes());
        out[64..96].copy_from_slice(self.precursor.compress().as_bytes());
        out[96..128].copy_from_slice(self.delegating_pk.as_bytes());
        out[128..160].copy_from_slice(self.receiving_pk.as_bytes());
        out[160..192].copy_from_slice(self.sig_r.compress().as_bytes());
        out[192..].copy_from_slice(self.sig_z.as_bytes());
        out
    }

    /// Decode a fragment. The signature is checked separately by [`Self::verify`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KFRAG_LEN {
            return Err(PreError::Serialization(format!(
                "key fragment must be {} bytes, got {}",
                KFRAG_LEN,
                bytes.len()
            )));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes[..32]);

        Ok(Self {
            id,
            rk: scalar(&bytes[32..64])?,
            precursor: point(&bytes[64..96])?,
            delegating_pk: PublicKey::from_bytes(&bytes[96..128])?,
            receiving_pk: PublicKey::from_bytes(&bytes[128..160])?,
            sig_r: point(&bytes[160..192])?,
            sig_z: scalar(&bytes[192..])?,
        })
    }
}

impl fmt::Debug for KeyFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFragment")
            .field("id", &hex::encode(&self.id[..8]))
            .field("delegating_pk", &self.delegating_pk)
            .field("receiving_pk", &self.receiving_pk)
            .finish_non_exhaustive()
    }
}

/// Horner evaluation of the sharing polynomial.
fn evaluate(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, c| acc * x + c)
}

fn signed_message(
    id: &[u8; 32],
    commitment: &RistrettoPoint,
    precursor: &RistrettoPoint,
    delegating_pk: &PublicKey,
    receiving_pk: &PublicKey,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(160);
    message.extend_from_slice(id);
    message.extend_from_slice(commitment.compress().as_bytes());
    message.extend_from_slice(precursor.compress().as_bytes());
    message.extend_from_slice(delegating_pk.as_bytes());
    message.extend_from_slice(receiving_pk.as_bytes());
    message
}

fn signature_challenge(r: &RistrettoPoint, signer: &PublicKey, message: &[u8]) -> Scalar {
    ScalarHasher::new(SIGNATURE_CONTEXT)
        .chain_point(r)
        .chain(signer.as_bytes())
        .chain(message)
        .finalize()
}

fn sign<R: RngCore + CryptoRng>(
    secret: &SecretKey,
    public: &PublicKey,
    message: &[u8],
    rng: &mut R,
) -> (RistrettoPoint, Scalar) {
    let mut k = Scalar::random(rng);
    let r = base_mul(&k);
    let z = k + signature_challenge(&r, public, message) * secret.scalar();
    k.zeroize();
    (r, z)
}

fn point(bytes: &[u8]) -> Result<RistrettoPoint> {
    CompressedRistretto::from_slice(bytes)
        .ok()
        .and_then(|c| c.decompress())
        .ok_or_else(|| PreError::Serialization("bad point encoding".into()))
}

fn scalar(bytes: &[u8]) -> Result<Scalar> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| PreError::Serialization("bad scalar length".into()))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(arr))
        .ok_or_else(|| PreError::Serialization("non-canonical scalar".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_fragments_verify() {
        let owner = SecretKey::random();
        let recipient = SecretKey::random().public_key();
        let kfrags = KeyFragment::generate(&owner, &recipient, 2, 3).unwrap();

        assert_eq!(kfrags.len(), 3);
        for kfrag in &kfrags {
            kfrag.verify().unwrap();
            assert_eq!(kfrag.delegating_pk(), &owner.public_key());
            assert_eq!(kfrag.receiving_pk(), &recipient);
        }
        assert_ne!(kfrags[0].id, kfrags[1].id);
    }

    #[test]
    fn test_verify_delegation_checks_both_keys() {
        let owner = SecretKey::random();
        let recipient = SecretKey::random().public_key();
        let stranger = SecretKey::random().public_key();
        let kfrag = KeyFragment::generate(&owner, &recipient, 1, 1)
            .unwrap()
            .remove(0);

        kfrag
            .verify_delegation(&owner.public_key(), &recipient)
            .unwrap();
        assert!(matches!(
            kfrag.verify_delegation(&owner.public_key(), &stranger),
            Err(PreError::FragmentVerification(_))
        ));
        assert!(matches!(
            kfrag.verify_delegation(&stranger, &recipient),
            Err(PreError::FragmentVerification(_))
        ));
    }

    #[test]
    fn test_invalid_threshold() {
        let owner = SecretKey::random();
        let recipient = SecretKey::random().public_key();
        assert!(matches!(
            KeyFragment::generate(&owner, &recipient, 0, 1),
            Err(PreError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            KeyFragment::generate(&owner, &recipient, 3, 2),
            Err(PreError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_tampered_fragment_fails_verification() {
        let owner = SecretKey::random();
        let recipient = SecretKey::random().public_key();
        let mut kfrag = KeyFragment::generate(&owner, &recipient, 1, 1)
            .unwrap()
            .remove(0);

        kfrag.rk += Scalar::ONE;
        assert!(matches!(
            kfrag.verify(),
            Err(PreError::FragmentVerification(_))
        ));
    }

    #[test]
    fn test_swapped_recipient_fails_verification() {
        let owner = SecretKey::random();
        let recipient = SecretKey::random().public_key();
        let mut kfrag = KeyFragment::generate(&owner, &recipient, 1, 1)
            .unwrap()
            .remove(0);

        kfrag.receiving_pk = SecretKey::random().public_key();
        assert!(kfrag.verify().is_err());
    }

    #[test]
    fn test_fragment_bytes_roundtrip() {
        let owner = SecretKey::random();
        let recipient = SecretKey::random().public_key();
        let kfrag = KeyFragment::generate(&owner, &recipient, 1, 1)
            .unwrap()
            .remove(0);

        let restored = KeyFragment::from_bytes(&kfrag.to_bytes()).unwrap();
        assert_eq!(restored, kfrag);
        restored.verify().unwrap();
        assert!(KeyFragment::from_bytes(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_polynomial_constant_term() {
        let c = [Scalar::from(5u64), Scalar::from(3u64)];
        assert_eq!(evaluate(&c, &Scalar::ZERO), Scalar::from(5u64));
        assert_eq!(evaluate(&c, &Scalar::from(2u64)), Scalar::from(11u64));
    }
}
