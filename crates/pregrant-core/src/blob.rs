//! Blob documents exchanged through the content store.
//!
//! Both formats are JSON with hex byte fields.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hex_serde;
use crate::types::{ContentId, PrincipalId};

/// An owner-encrypted payload as uploaded by the produce step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub logical_source_id: String,
    #[serde(with = "hex_serde")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_serde")]
    pub capsule: Vec<u8>,
}

impl EncryptedBlob {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let blob: Self =
            serde_json::from_slice(bytes).map_err(|e| CoreError::MalformedBlob(e.to_string()))?;
        if blob.capsule.is_empty() {
            return Err(CoreError::MalformedBlob("empty capsule".into()));
        }
        Ok(blob)
    }
}

/// The proxy's output for one grant.
///
/// Carries the original ciphertext and capsule unchanged next to the capsule
/// fragment only `recipient_id` can combine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedBlob {
    pub original_content_id: ContentId,
    pub recipient_id: PrincipalId,
    #[serde(with = "hex_serde")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_serde")]
    pub capsule: Vec<u8>,
    #[serde(with = "hex_serde")]
    pub capsule_fragment: Vec<u8>,
}

impl TransformedBlob {
    /// Serialize to JSON bytes.
    ///
    /// Field order is fixed by the struct, so equal blobs always produce
    /// equal bytes and therefore equal content ids.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let blob: Self =
            serde_json::from_slice(bytes).map_err(|e| CoreError::MalformedBlob(e.to_string()))?;
        if blob.capsule_fragment.is_empty() {
            return Err(CoreError::MalformedBlob("empty capsule fragment".into()));
        }
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_blob_hex_fields() {
        let blob = EncryptedBlob {
            logical_source_id: "sensor-1".into(),
            ciphertext: vec![0xde, 0xad],
            capsule: vec![0xbe, 0xef],
        };
        let bytes = blob.to_json_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"dead\""));
        assert!(text.contains("\"beef\""));
        assert_eq!(EncryptedBlob::from_json_bytes(&bytes).unwrap(), blob);
    }

    #[test]
    fn test_malformed_blob_rejected() {
        assert!(matches!(
            EncryptedBlob::from_json_bytes(b"not json"),
            Err(CoreError::MalformedBlob(_))
        ));
        assert!(matches!(
            EncryptedBlob::from_json_bytes(br#"{"logical_source_id":"s","ciphertext":"zz","capsule":"00"}"#),
            Err(CoreError::MalformedBlob(_))
        ));
        assert!(matches!(
            EncryptedBlob::from_json_bytes(br#"{"logical_source_id":"s","ciphertext":"","capsule":""}"#),
            Err(CoreError::MalformedBlob(_))
        ));
    }

    #[test]
    fn test_transformed_blob_bytes_deterministic() {
        let blob = TransformedBlob {
            original_content_id: "X1".into(),
            recipient_id: "R1".into(),
            ciphertext: vec![1, 2, 3],
            capsule: vec![4],
            capsule_fragment: vec![5, 6],
        };
        assert_eq!(
            blob.to_json_bytes().unwrap(),
            blob.clone().to_json_bytes().unwrap()
        );
        let back = TransformedBlob::from_json_bytes(&blob.to_json_bytes().unwrap()).unwrap();
        assert_eq!(back, blob);
    }
}
