//! Data encapsulation: ChaCha20-Poly1305 keyed from the capsule's shared point.
//!
//! Sealed layout is `nonce (12) || ciphertext || tag (16)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{PreError, Result};
use crate::hashing::DEM_CONTEXT;

pub(crate) const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key derived from a shared point.
pub(crate) struct DemKey(Zeroizing<[u8; 32]>);

impl DemKey {
    /// Derive the key for a shared point.
    pub(crate) fn derive(shared: &RistrettoPoint) -> Self {
        Self(Zeroizing::new(blake3::derive_key(
            DEM_CONTEXT,
            shared.compress().as_bytes(),
        )))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.0[..]).map_err(|e| PreError::Encryption(e.to_string()))
    }

    /// Encrypt under a fresh random nonce, binding `aad`.
    pub(crate) fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| PreError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt and authenticate.
    pub(crate) fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(PreError::Decryption(format!(
                "ciphertext too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        self.cipher()?
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| PreError::Decryption("authentication failed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::scalar::Scalar;

    use crate::hashing::base_mul;

    fn point(n: u64) -> RistrettoPoint {
        base_mul(&Scalar::from(n))
    }

    #[test]
    fn test_seal_open() {
        let key = DemKey::derive(&point(7));
        let sealed = key.seal(b"hello, world!", b"capsule").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 13 + TAG_LEN);
        assert_eq!(key.open(&sealed, b"capsule").unwrap(), b"hello, world!");
    }

    #[test]
    fn test_open_wrong_key_or_aad_fails() {
        let key = DemKey::derive(&point(7));
        let other = DemKey::derive(&point(8));
        let sealed = key.seal(b"secret", b"aad").unwrap();

        assert!(other.open(&sealed, b"aad").is_err());
        assert!(key.open(&sealed, b"other aad").is_err());
    }

    #[test]
    fn test_open_truncated_fails() {
        let key = DemKey::derive(&point(7));
        assert!(matches!(
            key.open(&[0u8; 10], b""),
            Err(PreError::Decryption(_))
        ));
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = DemKey::derive(&point(7));
        let a = key.seal(b"same", b"").unwrap();
        let b = key.seal(b"same", b"").unwrap();
        assert_ne!(a, b);
    }
}
