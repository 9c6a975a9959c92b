//! The versioned event envelope.

use std::fmt;

use cohort_core::MetadataCollectionId;
use serde::Deserialize;
use serde::Serialize;

use crate::payload::EventPayload;

/// Canonical wire protocol version emitted by this crate.
pub const PROTOCOL_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    #[serde(rename = "registry")]
    Registry,
    #[serde(rename = "typedef")]
    TypeDef,
    #[serde(rename = "instance")]
    Instance,
}

impl EventCategory {
    pub const ALL: [EventCategory; 3] = [EventCategory::Registry, EventCategory::TypeDef, EventCategory::Instance];

    pub fn index(self) -> usize {
        match self {
            EventCategory::Registry => 0,
            EventCategory::TypeDef => 1,
            EventCategory::Instance => 2,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventCategory::Registry => "registry",
            EventCategory::TypeDef => "typedef",
            EventCategory::Instance => "instance",
        };
        f.write_str(s)
    }
}

/// The member that published an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventOriginator {
    pub metadata_collection_id: MetadataCollectionId,
    pub server_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub protocol_version: u32,
    pub timestamp_ms: u64,
    pub originator: EventOriginator,
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn new(originator: EventOriginator, timestamp_ms: u64, payload: impl Into<EventPayload>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            timestamp_ms,
            originator,
            payload: payload.into(),
        }
    }

    pub fn category(&self) -> EventCategory {
        self.payload.category()
    }

    pub fn originator_id(&self) -> &MetadataCollectionId {
        &self.originator.metadata_collection_id
    }
}
