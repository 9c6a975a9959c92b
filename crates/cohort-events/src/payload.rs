//! Event payloads, one enum per category.

use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::MemberRegistration;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::TypeDef;
use cohort_core::TypeDefPatch;
use serde::Deserialize;
use serde::Serialize;

use crate::envelope::EventCategory;

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationErrorCode {
    /// The id is already registered with a different connection.
    ConflictingCollectionId,
    /// The registration's connection details are unusable.
    BadRemoteConnection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A member joins the cohort.
    Registration { registration: MemberRegistration },
    /// A member refreshes its registration or answers a newcomer.
    ReRegistration { registration: MemberRegistration },
    /// A member leaves the cohort.
    Unregistration { metadata_collection_id: MetadataCollectionId },
    /// Ask every member to re-register.
    RefreshRequest,
    /// A registration from `target` was refused.
    RegistrationError {
        code: RegistrationErrorCode,
        target: MetadataCollectionId,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDefEvent {
    NewTypeDef { typedef: TypeDef },
    UpdatedTypeDef { patch: TypeDefPatch, typedef: TypeDef },
    /// The sender holds an incompatible definition announced by `target`.
    TypeDefConflict {
        type_name: String,
        local_guid: Guid,
        remote_guid: Guid,
        target: MetadataCollectionId,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstanceEvent {
    NewEntity { entity: Entity },
    UpdatedEntity { entity: Entity },
    DeletedEntity { entity: Entity },
    PurgedEntity {
        guid: Guid,
        type_name: String,
        home: MetadataCollectionId,
    },
    RefreshEntityRequest {
        guid: Guid,
        type_name: String,
        home: MetadataCollectionId,
    },
    RefreshedEntity { entity: Entity },
    NewRelationship { relationship: Relationship },
    UpdatedRelationship { relationship: Relationship },
    DeletedRelationship { relationship: Relationship },
    PurgedRelationship {
        guid: Guid,
        type_name: String,
        home: MetadataCollectionId,
    },
    RefreshRelationshipRequest {
        guid: Guid,
        type_name: String,
        home: MetadataCollectionId,
    },
    RefreshedRelationship { relationship: Relationship },
    /// Sent to a member whose event contradicted an instance's home.
    InstanceConflict {
        guid: Guid,
        home: MetadataCollectionId,
        target: MetadataCollectionId,
        message: String,
    },
}

impl InstanceEvent {
    /// GUID of the instance the event concerns.
    pub fn guid(&self) -> &Guid {
        match self {
            InstanceEvent::NewEntity { entity }
            | InstanceEvent::UpdatedEntity { entity }
            | InstanceEvent::DeletedEntity { entity }
            | InstanceEvent::RefreshedEntity { entity } => &entity.header.guid,
            InstanceEvent::NewRelationship { relationship }
            | InstanceEvent::UpdatedRelationship { relationship }
            | InstanceEvent::DeletedRelationship { relationship }
            | InstanceEvent::RefreshedRelationship { relationship } => &relationship.header.guid,
            InstanceEvent::PurgedEntity { guid, .. }
            | InstanceEvent::RefreshEntityRequest { guid, .. }
            | InstanceEvent::PurgedRelationship { guid, .. }
            | InstanceEvent::RefreshRelationshipRequest { guid, .. }
            | InstanceEvent::InstanceConflict { guid, .. } => guid,
        }
    }
}

/// Payload of an envelope. The variant determines the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Registry(RegistryEvent),
    TypeDef(TypeDefEvent),
    Instance(InstanceEvent),
}

impl EventPayload {
    pub fn category(&self) -> EventCategory {
        match self {
            EventPayload::Registry(_) => EventCategory::Registry,
            EventPayload::TypeDef(_) => EventCategory::TypeDef,
            EventPayload::Instance(_) => EventCategory::Instance,
        }
    }
}

impl From<RegistryEvent> for EventPayload {
    fn from(event: RegistryEvent) -> Self {
        EventPayload::Registry(event)
    }
}

impl From<TypeDefEvent> for EventPayload {
    fn from(event: TypeDefEvent) -> Self {
        EventPayload::TypeDef(event)
    }
}

impl From<InstanceEvent> for EventPayload {
    fn from(event: InstanceEvent) -> Self {
        EventPayload::Instance(event)
    }
}
