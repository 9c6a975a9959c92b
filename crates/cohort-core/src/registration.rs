//! Cohort membership records.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::ids::MetadataCollectionId;

/// How to reach a member's repository connector.
///
/// Two descriptors are materially different when their connector type or
/// endpoint differ. Properties are advisory and may change between
/// refreshes without constituting a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub connector_type: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    pub fn new(connector_type: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            endpoint: endpoint.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn materially_differs(&self, other: &ConnectionDescriptor) -> bool {
        self.connector_type != other.connector_type || self.endpoint != other.endpoint
    }

    /// Check the descriptor is usable. Returns the reason when it is not.
    pub fn validate(&self) -> Result<(), String> {
        if self.connector_type.trim().is_empty() {
            return Err("connector type is empty".to_string());
        }
        if self.endpoint.trim().is_empty() {
            return Err("endpoint is empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.connector_type, self.endpoint)
    }
}

/// One member's announcement of itself to the cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRegistration {
    pub metadata_collection_id: MetadataCollectionId,
    pub server_name: String,
    pub connection: ConnectionDescriptor,
    pub registration_timestamp_ms: u64,
    pub latest_refresh_timestamp_ms: u64,
}

impl MemberRegistration {
    pub fn new(
        metadata_collection_id: MetadataCollectionId,
        server_name: impl Into<String>,
        connection: ConnectionDescriptor,
        now_ms: u64,
    ) -> Self {
        Self {
            metadata_collection_id,
            server_name: server_name.into(),
            connection,
            registration_timestamp_ms: now_ms,
            latest_refresh_timestamp_ms: now_ms,
        }
    }

    /// Check the registration carries enough to be admitted.
    pub fn validate(&self) -> Result<(), String> {
        if self.metadata_collection_id.is_empty() {
            return Err("metadata collection id is empty".to_string());
        }
        if self.server_name.trim().is_empty() {
            return Err("server name is empty".to_string());
        }
        self.connection.validate()
    }
}

/// Lifecycle state of a remote member as seen by the local registry.
///
/// ```text
/// Unknown -> Announced -> Active <-> Stale -> Retired
///                 \______________________/^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Unknown,
    Announced,
    Active,
    Stale,
    Retired,
}

impl MemberState {
    /// Whether federated queries are dispatched to a member in this state.
    pub fn is_fanout_target(self) -> bool {
        matches!(self, MemberState::Active | MemberState::Stale)
    }

    pub fn is_retired(self) -> bool {
        self == MemberState::Retired
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberState::Unknown => "unknown",
            MemberState::Announced => "announced",
            MemberState::Active => "active",
            MemberState::Stale => "stale",
            MemberState::Retired => "retired",
        };
        f.write_str(s)
    }
}

/// A remote member's registration plus its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMember {
    pub registration: MemberRegistration,
    pub state: MemberState,
    #[serde(default)]
    pub missed_refreshes: u32,
    #[serde(default)]
    pub consecutive_unreachable: u32,
    #[serde(default)]
    pub retired_at_ms: Option<u64>,
    /// Reference copies homed at this member have been removed.
    #[serde(default)]
    pub reference_copies_purged: bool,
}

impl RemoteMember {
    pub fn announced(registration: MemberRegistration) -> Self {
        Self {
            registration,
            state: MemberState::Announced,
            missed_refreshes: 0,
            consecutive_unreachable: 0,
            retired_at_ms: None,
            reference_copies_purged: false,
        }
    }

    pub fn id(&self) -> &MetadataCollectionId {
        &self.registration.metadata_collection_id
    }
}

/// The registry's durable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortMembership {
    pub local_registration: Option<MemberRegistration>,
    /// Remote members in discovery order.
    #[serde(default)]
    pub remote_members: Vec<RemoteMember>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_are_not_material() {
        let a = ConnectionDescriptor::new("in-memory", "repo-a").with_property("zone", "eu");
        let b = ConnectionDescriptor::new("in-memory", "repo-a");
        assert!(!a.materially_differs(&b));
        assert!(a.materially_differs(&ConnectionDescriptor::new("in-memory", "repo-b")));
        assert!(a.materially_differs(&ConnectionDescriptor::new("rest", "repo-a")));
    }

    #[test]
    fn test_registration_validation() {
        let conn = ConnectionDescriptor::new("in-memory", "repo-a");
        let ok = MemberRegistration::new("a".into(), "server-a", conn.clone(), 1);
        assert!(ok.validate().is_ok());

        let no_name = MemberRegistration::new("a".into(), " ", conn.clone(), 1);
        assert!(no_name.validate().is_err());

        let no_endpoint = MemberRegistration::new("a".into(), "server-a", ConnectionDescriptor::new("in-memory", ""), 1);
        assert!(no_endpoint.validate().is_err());
    }

    #[test]
    fn test_fanout_targets() {
        assert!(MemberState::Active.is_fanout_target());
        assert!(MemberState::Stale.is_fanout_target());
        assert!(!MemberState::Announced.is_fanout_target());
        assert!(!MemberState::Retired.is_fanout_target());
    }

    #[test]
    fn test_membership_tolerates_missing_counters() {
        let json = r#"{
            "local_registration": null,
            "remote_members": [{
                "registration": {
                    "metadata_collection_id": "b",
                    "server_name": "server-b",
                    "connection": {"connector_type": "in-memory", "endpoint": "b"},
                    "registration_timestamp_ms": 1,
                    "latest_refresh_timestamp_ms": 2
                },
                "state": "active"
            }]
        }"#;
        let membership: CohortMembership = serde_json::from_str(json).unwrap();
        assert_eq!(membership.remote_members[0].missed_refreshes, 0);
        assert_eq!(membership.remote_members[0].state, MemberState::Active);
    }
}
