//! JSON encoding of event envelopes.
//!
//! The category travels next to an untyped payload so a receiver can reject
//! a payload that does not belong to its category without guessing. Legacy
//! v1 envelopes are migrated once here and never emitted.

use cohort_core::CoreError;
use cohort_core::constants::MAX_EVENT_SIZE;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::envelope::EventCategory;
use crate::envelope::EventEnvelope;
use crate::envelope::EventOriginator;
use crate::envelope::PROTOCOL_VERSION;
use crate::legacy;
use crate::payload::EventPayload;

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    protocol_version: u32,
    timestamp_ms: u64,
    originator: EventOriginator,
    category: EventCategory,
    payload: Value,
}

/// Encode an envelope for the bus.
///
/// # Errors
/// [`CoreError::InvalidParameter`] if the encoded event exceeds
/// [`MAX_EVENT_SIZE`].
pub fn encode(envelope: &EventEnvelope) -> Result<Vec<u8>, CoreError> {
    let payload = match &envelope.payload {
        EventPayload::Registry(event) => serde_json::to_value(event),
        EventPayload::TypeDef(event) => serde_json::to_value(event),
        EventPayload::Instance(event) => serde_json::to_value(event),
    }
    .map_err(|e| CoreError::invalid("event.payload", e.to_string()))?;

    let wire = WireEnvelope {
        protocol_version: envelope.protocol_version,
        timestamp_ms: envelope.timestamp_ms,
        originator: envelope.originator.clone(),
        category: envelope.category(),
        payload,
    };
    let bytes = serde_json::to_vec(&wire).map_err(|e| CoreError::invalid("event", e.to_string()))?;
    if bytes.len() > MAX_EVENT_SIZE {
        return Err(CoreError::invalid(
            "event",
            format!("encoded event is {} bytes (max {})", bytes.len(), MAX_EVENT_SIZE),
        ));
    }
    Ok(bytes)
}

/// Decode an envelope received from the bus.
///
/// # Errors
/// [`CoreError::MalformedEvent`] for oversize input, unparseable JSON,
/// unsupported protocol versions, or a payload that does not match the
/// declared category.
pub fn decode(bytes: &[u8]) -> Result<EventEnvelope, CoreError> {
    if bytes.len() > MAX_EVENT_SIZE {
        return Err(CoreError::malformed(format!("event is {} bytes (max {})", bytes.len(), MAX_EVENT_SIZE)));
    }
    let value: Value = serde_json::from_slice(bytes).map_err(|e| CoreError::malformed(format!("invalid JSON: {e}")))?;

    if legacy::is_legacy(&value) {
        return legacy::migrate(value);
    }

    let version = value
        .get("protocol_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| CoreError::malformed("missing protocol_version"))?;
    if version != u64::from(PROTOCOL_VERSION) {
        return Err(CoreError::malformed(format!("unsupported protocol version {version}")));
    }

    let wire: WireEnvelope =
        serde_json::from_value(value).map_err(|e| CoreError::malformed(format!("invalid envelope: {e}")))?;
    if wire.originator.metadata_collection_id.is_empty() {
        return Err(CoreError::malformed("originator has no metadata collection id"));
    }

    let payload = decode_payload(wire.category, wire.payload)?;
    Ok(EventEnvelope {
        protocol_version: wire.protocol_version,
        timestamp_ms: wire.timestamp_ms,
        originator: wire.originator,
        payload,
    })
}

fn decode_payload(category: EventCategory, payload: Value) -> Result<EventPayload, CoreError> {
    let mismatch = |e: serde_json::Error| CoreError::malformed(format!("payload is not a valid {category} event: {e}"));
    Ok(match category {
        EventCategory::Registry => EventPayload::Registry(serde_json::from_value(payload).map_err(mismatch)?),
        EventCategory::TypeDef => EventPayload::TypeDef(serde_json::from_value(payload).map_err(mismatch)?),
        EventCategory::Instance => EventPayload::Instance(serde_json::from_value(payload).map_err(mismatch)?),
    })
}

#[cfg(test)]
mod tests {
    use cohort_core::Entity;
    use cohort_core::Guid;

    use super::*;
    use crate::payload::InstanceEvent;
    use crate::payload::RegistryEvent;

    fn originator() -> EventOriginator {
        EventOriginator {
            metadata_collection_id: "repo-a".into(),
            server_name: "server-a".to_string(),
        }
    }

    #[test]
    fn test_instance_event_survives_the_wire() {
        let entity = Entity::new(Guid::new("g1"), "Asset", "repo-a".into(), 7).with_property("name", "orders");
        let envelope = EventEnvelope::new(originator(), 42, InstanceEvent::NewEntity { entity });
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.category(), EventCategory::Instance);
    }

    #[test]
    fn test_wire_shape_carries_category_and_version() {
        let envelope = EventEnvelope::new(originator(), 1, RegistryEvent::RefreshRequest);
        let value: Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(value["protocol_version"], 2);
        assert_eq!(value["category"], "registry");
        assert_eq!(value["payload"]["kind"], "refresh_request");
    }

    #[test]
    fn test_category_payload_mismatch_is_malformed() {
        let raw = br#"{"protocol_version":2,"timestamp_ms":1,
            "originator":{"metadata_collection_id":"a","server_name":"s"},
            "category":"typedef","payload":{"kind":"refresh_request"}}"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedEvent { .. })));
    }

    #[test]
    fn test_unknown_version_and_garbage_are_malformed() {
        let future = br#"{"protocol_version":9,"timestamp_ms":1,
            "originator":{"metadata_collection_id":"a","server_name":"s"},
            "category":"registry","payload":{"kind":"refresh_request"}}"#;
        assert!(matches!(decode(future), Err(CoreError::MalformedEvent { .. })));
        assert!(matches!(decode(b"not json"), Err(CoreError::MalformedEvent { .. })));
        assert!(matches!(decode(b"{}"), Err(CoreError::MalformedEvent { .. })));
    }

    #[test]
    fn test_oversize_input_is_rejected_before_parsing() {
        let big = vec![b' '; MAX_EVENT_SIZE + 1];
        let err = decode(&big).unwrap_err();
        assert!(err.to_string().contains("max"));
    }
}
