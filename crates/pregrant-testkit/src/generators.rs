//! Proptest generators for property-based testing.

use proptest::prelude::*;

use pregrant_core::{ContentId, DataRecord, GrantKey, PrincipalId};

/// Generate payload bytes of at most `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Payloads weighted toward the edges: empty, tiny, and several kilobytes.
pub fn payload_sizes() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        payload(64),
        prop::collection::vec(any::<u8>(), 4096..=12_288),
    ]
}

/// A sensor reading serialized as JSON, like the producer emits.
pub fn sensor_reading() -> impl Strategy<Value = Vec<u8>> {
    (-40.0f64..60.0, 0u32..100, "[a-z]{3,8}-[0-9]{1,2}").prop_map(|(temp, humidity, sensor)| {
        serde_json::to_vec(&serde_json::json!({
            "sensor": sensor,
            "temp": temp,
            "humidity": humidity,
        }))
        .unwrap_or_default()
    })
}

/// A principal identifier.
pub fn principal_id() -> impl Strategy<Value = PrincipalId> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(PrincipalId::new)
}

/// A content identifier derived from random bytes.
pub fn content_id() -> impl Strategy<Value = ContentId> {
    any::<[u8; 16]>().prop_map(|bytes| ContentId::for_bytes(&bytes))
}

/// A grant key.
pub fn grant_key() -> impl Strategy<Value = GrantKey> {
    (content_id(), principal_id()).prop_map(|(content_id, recipient_id)| {
        GrantKey::new(content_id, recipient_id)
    })
}

/// A data record over random blob bytes.
pub fn data_record() -> impl Strategy<Value = DataRecord> {
    (payload(256), principal_id(), "[a-z]{1,12}").prop_map(|(blob, owner, source)| {
        DataRecord::new(ContentId::for_bytes(&blob), &blob, owner, source)
    })
}
