//! The re-encryption capability consumed by the engine.

use crate::capsule::Capsule;
use crate::cfrag::{open_reencrypted, CapsuleFragment};
use crate::dem::DemKey;
use crate::error::{PreError, Result};
use crate::keys::{PublicKey, SecretKey};
use crate::kfrag::KeyFragment;

/// Threshold proxy re-encryption.
///
/// The engine only ever talks to this trait, so tests can wrap the real
/// scheme to inject failures.
pub trait PreScheme: Send + Sync {
    /// Generate a fresh key pair.
    fn generate_keypair(&self) -> (SecretKey, PublicKey);

    /// Encrypt for `owner`, returning the capsule and the sealed ciphertext.
    fn encrypt(&self, owner: &PublicKey, plaintext: &[u8]) -> Result<(Capsule, Vec<u8>)>;

    /// Derive `shares` key fragments delegating `owner`'s decryption right
    /// to `recipient`, any `threshold` of which suffice.
    fn derive_fragments(
        &self,
        owner: &SecretKey,
        recipient: &PublicKey,
        threshold: usize,
        shares: usize,
    ) -> Result<Vec<KeyFragment>>;

    /// Transform a capsule with one key fragment. Verifies both first.
    fn transform(&self, capsule: &Capsule, fragment: &KeyFragment) -> Result<CapsuleFragment>;

    /// Recipient-side decryption from capsule fragments.
    fn combine_and_decrypt(
        &self,
        recipient: &SecretKey,
        owner: &PublicKey,
        capsule: &Capsule,
        fragments: &[CapsuleFragment],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Owner-side decryption of the owner's own ciphertext.
    fn decrypt_original(
        &self,
        owner: &SecretKey,
        capsule: &Capsule,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;
}

/// [`PreScheme`] over Ristretto255 with a ChaCha20-Poly1305 DEM.
#[derive(Debug, Clone, Copy, Default)]
pub struct RistrettoPre;

impl RistrettoPre {
    pub fn new() -> Self {
        Self
    }
}

impl PreScheme for RistrettoPre {
    fn generate_keypair(&self) -> (SecretKey, PublicKey) {
        let secret = SecretKey::random();
        let public = secret.public_key();
        (secret, public)
    }

    fn encrypt(&self, owner: &PublicKey, plaintext: &[u8]) -> Result<(Capsule, Vec<u8>)> {
        let (capsule, shared) = Capsule::encapsulate(owner);
        let ciphertext = DemKey::derive(&shared).seal(plaintext, &capsule.to_bytes())?;
        Ok((capsule, ciphertext))
    }

    fn derive_fragments(
        &self,
        owner: &SecretKey,
        recipient: &PublicKey,
        threshold: usize,
        shares: usize,
    ) -> Result<Vec<KeyFragment>> {
        KeyFragment::generate(owner, recipient, threshold, shares)
    }

    fn transform(&self, capsule: &Capsule, fragment: &KeyFragment) -> Result<CapsuleFragment> {
        if !capsule.verify() {
            return Err(PreError::InvalidCapsule("proof does not verify".into()));
        }
        fragment.verify()?;
        Ok(CapsuleFragment::reencrypt(capsule, fragment))
    }

    fn combine_and_decrypt(
        &self,
        recipient: &SecretKey,
        owner: &PublicKey,
        capsule: &Capsule,
        fragments: &[CapsuleFragment],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let shared = open_reencrypted(recipient, owner, fragments)?;
        DemKey::derive(&shared).open(ciphertext, &capsule.to_bytes())
    }

    fn decrypt_original(
        &self,
        owner: &SecretKey,
        capsule: &Capsule,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let shared = capsule.open_original(owner);
        DemKey::derive(&shared).open(ciphertext, &capsule.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Party {
        secret: SecretKey,
        public: PublicKey,
    }

    fn party(pre: &RistrettoPre) -> Party {
        let (secret, public) = pre.generate_keypair();
        Party { secret, public }
    }

    fn roundtrip(plaintext: &[u8]) -> Vec<u8> {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let recipient = party(&pre);

        let (capsule, ciphertext) = pre.encrypt(&owner.public, plaintext).unwrap();
        let kfrags = pre
            .derive_fragments(&owner.secret, &recipient.public, 1, 1)
            .unwrap();
        let cfrag = pre.transform(&capsule, &kfrags[0]).unwrap();

        pre.combine_and_decrypt(&recipient.secret, &owner.public, &capsule, &[cfrag], &ciphertext)
            .unwrap()
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        assert_eq!(roundtrip(b""), b"");
    }

    #[test]
    fn test_roundtrip_large_json() {
        let readings: Vec<String> = (0..500)
            .map(|i| format!("{{\"sensor\":\"s-{}\",\"temp\":{}.5}}", i, i % 40))
            .collect();
        let document = format!("[{}]", readings.join(","));
        assert!(document.len() > 8 * 1024);

        assert_eq!(roundtrip(document.as_bytes()), document.as_bytes());
    }

    #[test]
    fn test_owner_decrypts_original() {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let (capsule, ciphertext) = pre.encrypt(&owner.public, b"{\"temp\": 21.5}").unwrap();

        let plaintext = pre
            .decrypt_original(&owner.secret, &capsule, &ciphertext)
            .unwrap();
        assert_eq!(plaintext, b"{\"temp\": 21.5}");

        let stranger = party(&pre);
        assert!(pre
            .decrypt_original(&stranger.secret, &capsule, &ciphertext)
            .is_err());
    }

    #[test]
    fn test_threshold_two_of_three() {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let recipient = party(&pre);

        let (capsule, ciphertext) = pre.encrypt(&owner.public, b"threshold").unwrap();
        let kfrags = pre
            .derive_fragments(&owner.secret, &recipient.public, 2, 3)
            .unwrap();
        let cfrags: Vec<CapsuleFragment> = kfrags
            .iter()
            .map(|k| pre.transform(&capsule, k).unwrap())
            .collect();

        for pair in [[0, 1], [0, 2], [1, 2]] {
            let subset = [cfrags[pair[0]].clone(), cfrags[pair[1]].clone()];
            let plaintext = pre
                .combine_and_decrypt(&recipient.secret, &owner.public, &capsule, &subset, &ciphertext)
                .unwrap();
            assert_eq!(plaintext, b"threshold");
        }

        let single = pre.combine_and_decrypt(
            &recipient.secret,
            &owner.public,
            &capsule,
            &cfrags[..1],
            &ciphertext,
        );
        assert!(matches!(single, Err(PreError::Decryption(_))));
    }

    #[test]
    fn test_wrong_recipient_cannot_decrypt() {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let recipient = party(&pre);
        let eavesdropper = party(&pre);

        let (capsule, ciphertext) = pre.encrypt(&owner.public, b"private").unwrap();
        let kfrags = pre
            .derive_fragments(&owner.secret, &recipient.public, 1, 1)
            .unwrap();
        let cfrag = pre.transform(&capsule, &kfrags[0]).unwrap();

        let result = pre.combine_and_decrypt(
            &eavesdropper.secret,
            &owner.public,
            &capsule,
            &[cfrag],
            &ciphertext,
        );
        assert!(matches!(result, Err(PreError::MismatchedFragments(_))));
    }

    #[test]
    fn test_wrong_owner_rejected() {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let recipient = party(&pre);
        let other_owner = party(&pre);

        let (capsule, ciphertext) = pre.encrypt(&owner.public, b"x").unwrap();
        let kfrags = pre
            .derive_fragments(&owner.secret, &recipient.public, 1, 1)
            .unwrap();
        let cfrag = pre.transform(&capsule, &kfrags[0]).unwrap();

        assert!(pre
            .combine_and_decrypt(&recipient.secret, &other_owner.public, &capsule, &[cfrag], &ciphertext)
            .is_err());
    }

    #[test]
    fn test_transform_rejects_tampered_fragment() {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let recipient = party(&pre);

        let (capsule, _) = pre.encrypt(&owner.public, b"x").unwrap();
        let mut kfrag = pre
            .derive_fragments(&owner.secret, &recipient.public, 1, 1)
            .unwrap()
            .remove(0);
        kfrag.rk += curve25519_dalek::scalar::Scalar::ONE;

        assert!(matches!(
            pre.transform(&capsule, &kfrag),
            Err(PreError::FragmentVerification(_))
        ));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let pre = RistrettoPre::new();
        let owner = party(&pre);
        let recipient = party(&pre);

        let (capsule, _) = pre.encrypt(&owner.public, b"x").unwrap();
        let kfrag = pre
            .derive_fragments(&owner.secret, &recipient.public, 1, 1)
            .unwrap()
            .remove(0);

        let a = pre.transform(&capsule, &kfrag).unwrap();
        let b = pre.transform(&capsule, &kfrag).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(roundtrip(&payload), payload);
        }
    }
}
