//! Serde helpers that encode byte fields as lowercase hex strings.
//!
//! Used with `#[serde(with = "pregrant_core::hex_serde")]` on `Vec<u8>` fields
//! so that JSON documents stay readable and byte-exact.

use serde::{de, Deserialize, Deserializer, Serializer};

/// Serialize bytes as a hex string.
pub fn serialize<S>(bytes: impl AsRef<[u8]>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes.as_ref()))
}

/// Deserialize a hex string into bytes.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    hex::decode(&s).map_err(de::Error::custom)
}

/// Deserialize a hex string into a fixed-size array.
pub fn deserialize_array<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let bytes = deserialize(deserializer)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| de::Error::invalid_length(len, &"a fixed-size hex string"))
}
