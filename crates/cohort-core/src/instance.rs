//! Entities, relationships and their provenance headers.
//!
//! Every instance carries its home metadata collection id and a version
//! counter. A copy stored anywhere other than its home is a reference copy;
//! only the home may originate changes to the authoritative instance.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::Guid;
use crate::ids::MetadataCollectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Active,
    /// Soft-deleted by the home repository.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHeader {
    pub guid: Guid,
    pub type_name: String,
    pub home: MetadataCollectionId,
    pub version: u64,
    #[serde(default)]
    pub status: InstanceStatus,
    pub created_ms: u64,
    pub updated_ms: u64,
}

impl InstanceHeader {
    pub fn new(guid: Guid, type_name: impl Into<String>, home: MetadataCollectionId, now_ms: u64) -> Self {
        Self {
            guid,
            type_name: type_name.into(),
            home,
            version: 1,
            status: InstanceStatus::Active,
            created_ms: now_ms,
            updated_ms: now_ms,
        }
    }

    /// Whether a repository identified by `local` holds this as a reference copy.
    pub fn is_reference_copy_for(&self, local: &MetadataCollectionId) -> bool {
        &self.home != local
    }
}

/// Access to the provenance header shared by entities and relationships.
pub trait Instance: Clone + Send + Sync + 'static {
    fn header(&self) -> &InstanceHeader;

    fn header_mut(&mut self) -> &mut InstanceHeader;

    fn guid(&self) -> &Guid {
        &self.header().guid
    }

    fn version(&self) -> u64 {
        self.header().version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub header: InstanceHeader,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifications: Vec<String>,
}

impl Entity {
    pub fn new(guid: Guid, type_name: impl Into<String>, home: MetadataCollectionId, now_ms: u64) -> Self {
        Self {
            header: InstanceHeader::new(guid, type_name, home, now_ms),
            properties: BTreeMap::new(),
            classifications: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.header.version = version;
        self
    }
}

impl Instance for Entity {
    fn header(&self) -> &InstanceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut InstanceHeader {
        &mut self.header
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub header: InstanceHeader,
    pub end1: Guid,
    pub end2: Guid,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Relationship {
    pub fn new(
        guid: Guid,
        type_name: impl Into<String>,
        home: MetadataCollectionId,
        end1: Guid,
        end2: Guid,
        now_ms: u64,
    ) -> Self {
        Self {
            header: InstanceHeader::new(guid, type_name, home, now_ms),
            end1,
            end2,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.header.version = version;
        self
    }

    pub fn touches(&self, entity: &Guid) -> bool {
        &self.end1 == entity || &self.end2 == entity
    }
}

impl Instance for Relationship {
    fn header(&self) -> &InstanceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut InstanceHeader {
        &mut self.header
    }
}

/// Result ordering requested by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingOrder {
    #[default]
    Guid,
    LastUpdatedDesc,
    VersionDesc,
}

impl SequencingOrder {
    pub fn compare<T: Instance>(self, a: &T, b: &T) -> Ordering {
        let (ha, hb) = (a.header(), b.header());
        match self {
            SequencingOrder::Guid => ha.guid.cmp(&hb.guid),
            SequencingOrder::LastUpdatedDesc => hb.updated_ms.cmp(&ha.updated_ms).then_with(|| ha.guid.cmp(&hb.guid)),
            SequencingOrder::VersionDesc => hb.version.cmp(&ha.version).then_with(|| ha.guid.cmp(&hb.guid)),
        }
    }

    pub fn sort<T: Instance>(self, instances: &mut [T]) {
        instances.sort_by(|a, b| self.compare(a, b));
    }
}

/// How `property_equals` entries combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriteria {
    #[default]
    All,
    Any,
    None,
}

/// Filter applied by `find_entities`.
///
/// Every populated field must match; `match_criteria` decides how the
/// individual `property_equals` entries combine. `text` is a case-insensitive substring
/// match over string-valued properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<MetadataCollectionId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_equals: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub match_criteria: MatchCriteria,
    #[serde(default)]
    pub sequencing: SequencingOrder,
}

impl SearchCriteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn homed_at(home: MetadataCollectionId) -> Self {
        Self {
            home: Some(home),
            include_deleted: true,
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.property_equals.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_match_criteria(mut self, match_criteria: MatchCriteria) -> Self {
        self.match_criteria = match_criteria;
        self
    }

    pub fn sequenced_by(mut self, order: SequencingOrder) -> Self {
        self.sequencing = order;
        self
    }

    fn matches_header(&self, header: &InstanceHeader) -> bool {
        if !self.include_deleted && header.status == InstanceStatus::Deleted {
            return false;
        }
        if let Some(type_name) = &self.type_name {
            if &header.type_name != type_name {
                return false;
            }
        }
        if let Some(home) = &self.home {
            if &header.home != home {
                return false;
            }
        }
        true
    }

    fn matches_properties(&self, properties: &BTreeMap<String, Value>) -> bool {
        let mut hits = self.property_equals.iter().map(|(k, v)| properties.get(k) == Some(v));
        let equals = match self.match_criteria {
            MatchCriteria::All => hits.all(|hit| hit),
            MatchCriteria::Any => self.property_equals.is_empty() || hits.any(|hit| hit),
            MatchCriteria::None => !hits.any(|hit| hit),
        };
        if !equals {
            return false;
        }
        match &self.text {
            None => true,
            Some(text) => {
                let needle = text.to_lowercase();
                properties.values().any(|v| v.as_str().is_some_and(|s| s.to_lowercase().contains(&needle)))
            }
        }
    }

    pub fn matches_entity(&self, entity: &Entity) -> bool {
        self.matches_header(&entity.header) && self.matches_properties(&entity.properties)
    }

    pub fn matches_relationship(&self, relationship: &Relationship) -> bool {
        self.matches_header(&relationship.header) && self.matches_properties(&relationship.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(guid: &str, version: u64, updated: u64) -> Entity {
        let mut e = Entity::new(Guid::new(guid), "Asset", "home".into(), 0).with_version(version);
        e.header.updated_ms = updated;
        e
    }

    #[test]
    fn test_reference_copy_detection() {
        let e = entity("g1", 1, 0);
        assert!(!e.header.is_reference_copy_for(&"home".into()));
        assert!(e.header.is_reference_copy_for(&"elsewhere".into()));
    }

    #[test]
    fn test_criteria_matching() {
        let e = entity("g1", 1, 0).with_property("name", "Customer Table").with_property("rows", 10);
        assert!(SearchCriteria::all().matches_entity(&e));
        assert!(SearchCriteria::of_type("Asset").matches_entity(&e));
        assert!(!SearchCriteria::of_type("Process").matches_entity(&e));
        assert!(SearchCriteria::all().with_text("customer").matches_entity(&e));
        assert!(!SearchCriteria::all().with_text("orders").matches_entity(&e));
        assert!(SearchCriteria::all().with_property("rows", 10).matches_entity(&e));
        assert!(!SearchCriteria::all().with_property("rows", 11).matches_entity(&e));
    }

    #[test]
    fn test_any_needs_one_matching_property() {
        let e = entity("g1", 1, 0).with_property("owner", "ops").with_property("rows", 10);
        let any = SearchCriteria::all().with_match_criteria(MatchCriteria::Any);
        assert!(any.clone().matches_entity(&e));
        assert!(any.clone().with_property("owner", "ops").with_property("rows", 11).matches_entity(&e));
        assert!(!any.clone().with_property("owner", "dev").with_property("rows", 11).matches_entity(&e));
        assert!(!any.with_property("owner", "ops").with_text("orders").matches_entity(&e));
        assert!(!SearchCriteria::all().with_property("owner", "ops").with_property("rows", 11).matches_entity(&e));
    }

    #[test]
    fn test_none_excludes_any_matching_property() {
        let e = entity("g1", 1, 0).with_property("owner", "ops").with_property("rows", 10);
        let none = SearchCriteria::all().with_match_criteria(MatchCriteria::None);
        assert!(none.clone().matches_entity(&e));
        assert!(none.clone().with_property("owner", "dev").with_property("missing", 1).matches_entity(&e));
        assert!(!none.with_property("owner", "dev").with_property("rows", 10).matches_entity(&e));
    }

    #[test]
    fn test_match_criteria_defaults_to_all_when_absent() {
        let criteria: SearchCriteria = serde_json::from_str(r#"{"property_equals":{"rows":10}}"#).unwrap();
        assert_eq!(criteria.match_criteria, MatchCriteria::All);
        let any: SearchCriteria = serde_json::from_str(r#"{"match_criteria":"any"}"#).unwrap();
        assert_eq!(any.match_criteria, MatchCriteria::Any);
    }

    #[test]
    fn test_deleted_instances_hidden_by_default() {
        let mut e = entity("g1", 2, 0);
        e.header.status = InstanceStatus::Deleted;
        assert!(!SearchCriteria::all().matches_entity(&e));
        assert!(SearchCriteria::homed_at("home".into()).matches_entity(&e));
    }

    #[test]
    fn test_sequencing_orders() {
        let mut items = vec![entity("b", 1, 30), entity("a", 3, 10), entity("c", 2, 20)];

        SequencingOrder::Guid.sort(&mut items);
        assert_eq!(items.iter().map(|e| e.guid().as_str()).collect::<Vec<_>>(), ["a", "b", "c"]);

        SequencingOrder::LastUpdatedDesc.sort(&mut items);
        assert_eq!(items.iter().map(|e| e.guid().as_str()).collect::<Vec<_>>(), ["b", "c", "a"]);

        SequencingOrder::VersionDesc.sort(&mut items);
        assert_eq!(items.iter().map(|e| e.guid().as_str()).collect::<Vec<_>>(), ["a", "c", "b"]);
    }
}
