//! Migration of v1 envelopes.
//!
//! Version 1 members send a camel-cased envelope with a string protocol id
//! and one "section" per category. Only the event kinds version 1 members
//! actually emit are understood; anything else is malformed.

use cohort_core::ConnectionDescriptor;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::MemberRegistration;
use cohort_core::MetadataCollectionId;
use cohort_core::TypeDef;
use serde::Deserialize;
use serde_json::Value;

use crate::envelope::EventEnvelope;
use crate::envelope::EventOriginator;
use crate::payload::EventPayload;
use crate::payload::InstanceEvent;
use crate::payload::RegistryEvent;
use crate::payload::TypeDefEvent;

/// Protocol ids sent by version 1 members.
const LEGACY_PROTOCOL_IDS: [&str; 2] = ["V1.0", "OMRS V1.0"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEnvelope {
    protocol_version_id: String,
    #[serde(default)]
    timestamp: u64,
    originator: LegacyOriginator,
    event_category: String,
    registry_event_section: Option<LegacyRegistrySection>,
    type_def_event_section: Option<LegacyTypeDefSection>,
    instance_event_section: Option<LegacyInstanceSection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyOriginator {
    metadata_collection_id: String,
    #[serde(default)]
    server_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRegistrySection {
    registry_event_type: String,
    #[serde(default)]
    registration_timestamp: u64,
    remote_connection: Option<LegacyConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConnection {
    connector_type: String,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTypeDefSection {
    type_def_event_type: String,
    type_def: TypeDef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyInstanceSection {
    event_type: String,
    entity: Entity,
}

/// Whether `value` is shaped like a v1 envelope.
pub(crate) fn is_legacy(value: &Value) -> bool {
    value.get("protocolVersionId").is_some()
}

/// Convert a v1 envelope into the canonical form.
pub(crate) fn migrate(value: Value) -> Result<EventEnvelope, CoreError> {
    let legacy: LegacyEnvelope =
        serde_json::from_value(value).map_err(|e| CoreError::malformed(format!("invalid v1 envelope: {e}")))?;
    if !LEGACY_PROTOCOL_IDS.contains(&legacy.protocol_version_id.as_str()) {
        return Err(CoreError::malformed(format!("unsupported protocol id {}", legacy.protocol_version_id)));
    }
    if legacy.originator.metadata_collection_id.trim().is_empty() {
        return Err(CoreError::malformed("originator has no metadata collection id"));
    }

    let originator = EventOriginator {
        metadata_collection_id: MetadataCollectionId::new(legacy.originator.metadata_collection_id),
        server_name: legacy.originator.server_name,
    };

    let payload = match legacy.event_category.as_str() {
        "REGISTRY" => {
            let section = legacy.registry_event_section.ok_or_else(|| missing("registry"))?;
            EventPayload::Registry(migrate_registry(&originator, section)?)
        }
        "TYPEDEF" => {
            let section = legacy.type_def_event_section.ok_or_else(|| missing("typedef"))?;
            match section.type_def_event_type.as_str() {
                "NEW_TYPEDEF_EVENT" => EventPayload::TypeDef(TypeDefEvent::NewTypeDef {
                    typedef: section.type_def,
                }),
                other => return Err(unsupported(other)),
            }
        }
        "INSTANCE" => {
            let section = legacy.instance_event_section.ok_or_else(|| missing("instance"))?;
            let entity = section.entity;
            EventPayload::Instance(match section.event_type.as_str() {
                "NEW_ENTITY_EVENT" => InstanceEvent::NewEntity { entity },
                "UPDATED_ENTITY_EVENT" => InstanceEvent::UpdatedEntity { entity },
                "DELETED_ENTITY_EVENT" => InstanceEvent::DeletedEntity { entity },
                "REFRESHED_ENTITY_EVENT" => InstanceEvent::RefreshedEntity { entity },
                other => return Err(unsupported(other)),
            })
        }
        other => return Err(CoreError::malformed(format!("unknown v1 event category {other}"))),
    };

    Ok(EventEnvelope::new(originator, legacy.timestamp, payload))
}

fn migrate_registry(originator: &EventOriginator, section: LegacyRegistrySection) -> Result<RegistryEvent, CoreError> {
    let registration = || -> Result<MemberRegistration, CoreError> {
        let connection = section.remote_connection.as_ref().ok_or_else(|| missing("remoteConnection"))?;
        Ok(MemberRegistration {
            metadata_collection_id: originator.metadata_collection_id.clone(),
            server_name: originator.server_name.clone(),
            connection: ConnectionDescriptor::new(connection.connector_type.clone(), connection.endpoint.clone()),
            registration_timestamp_ms: section.registration_timestamp,
            latest_refresh_timestamp_ms: section.registration_timestamp,
        })
    };

    Ok(match section.registry_event_type.as_str() {
        "REGISTRATION_EVENT" => RegistryEvent::Registration {
            registration: registration()?,
        },
        "RE_REGISTRATION_EVENT" => RegistryEvent::ReRegistration {
            registration: registration()?,
        },
        "UN_REGISTRATION_EVENT" => RegistryEvent::Unregistration {
            metadata_collection_id: originator.metadata_collection_id.clone(),
        },
        "REFRESH_REGISTRATION_REQUEST" => RegistryEvent::RefreshRequest,
        other => return Err(unsupported(other)),
    })
}

fn missing(section: &str) -> CoreError {
    CoreError::malformed(format!("v1 envelope has no {section} section"))
}

fn unsupported(kind: &str) -> CoreError {
    CoreError::malformed(format!("unsupported v1 event type {kind}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::codec::encode;
    use crate::envelope::PROTOCOL_VERSION;

    #[test]
    fn test_v1_registration_is_migrated() {
        let raw = br#"{
            "protocolVersionId": "OMRS V1.0",
            "timestamp": 1000,
            "originator": {"metadataCollectionId": "legacy-repo", "serverName": "old-server"},
            "eventCategory": "REGISTRY",
            "registryEventSection": {
                "registryEventType": "REGISTRATION_EVENT",
                "registrationTimestamp": 900,
                "remoteConnection": {"connectorType": "rest", "endpoint": "https://old:9443"}
            }
        }"#;
        let envelope = decode(raw).unwrap();
        assert_eq!(envelope.protocol_version, PROTOCOL_VERSION);
        assert_eq!(envelope.originator_id().as_str(), "legacy-repo");
        match &envelope.payload {
            EventPayload::Registry(RegistryEvent::Registration { registration }) => {
                assert_eq!(registration.server_name, "old-server");
                assert_eq!(registration.connection.endpoint, "https://old:9443");
                assert_eq!(registration.registration_timestamp_ms, 900);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        // Re-encoding emits the canonical form only.
        let value: Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert!(value.get("protocolVersionId").is_none());
        assert_eq!(value["protocol_version"], 2);
    }

    #[test]
    fn test_v1_refresh_request_needs_no_connection() {
        let raw = br#"{
            "protocolVersionId": "V1.0",
            "originator": {"metadataCollectionId": "legacy-repo"},
            "eventCategory": "REGISTRY",
            "registryEventSection": {"registryEventType": "REFRESH_REGISTRATION_REQUEST"}
        }"#;
        let envelope = decode(raw).unwrap();
        assert_eq!(envelope.payload, EventPayload::Registry(RegistryEvent::RefreshRequest));
    }

    #[test]
    fn test_v1_unknown_kinds_are_malformed() {
        let raw = br#"{
            "protocolVersionId": "V1.0",
            "originator": {"metadataCollectionId": "legacy-repo"},
            "eventCategory": "REGISTRY",
            "registryEventSection": {"registryEventType": "SOMETHING_ELSE"}
        }"#;
        assert!(matches!(decode(raw), Err(CoreError::MalformedEvent { .. })));

        let wrong_id = br#"{"protocolVersionId": "V9", "originator": {"metadataCollectionId": "x"}, "eventCategory": "REGISTRY"}"#;
        assert!(matches!(decode(wrong_id), Err(CoreError::MalformedEvent { .. })));
    }
}
