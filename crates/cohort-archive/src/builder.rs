//! Assemble archives with stable GUIDs.

use std::collections::HashMap;
use std::collections::HashSet;

use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::Relationship;
use cohort_core::TypeDef;
use cohort_core::TypeDefCategory;
use cohort_core::TypeDefPatch;
use snafu::ResultExt;
use snafu::ensure;

use crate::archive::ArchiveInstanceStore;
use crate::archive::ArchiveProperties;
use crate::archive::ArchiveTypeStore;
use crate::archive::MetadataArchive;
use crate::error::BlankTypeNameSnafu;
use crate::error::DuplicateGuidSnafu;
use crate::error::DuplicateTypeNameSnafu;
use crate::error::InvalidContentSnafu;
use crate::error::Result;
use crate::guid_map::ArchiveGuidMap;

pub struct ArchiveBuilder {
    properties: ArchiveProperties,
    guid_map: ArchiveGuidMap,
    typedefs: Vec<TypeDef>,
    type_names: HashSet<String>,
    patches: Vec<TypeDefPatch>,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    /// Every GUID in the archive and what it was used for.
    guids: HashMap<Guid, String>,
}

impl ArchiveBuilder {
    pub fn new(properties: ArchiveProperties, guid_map: ArchiveGuidMap) -> Self {
        Self {
            properties,
            guid_map,
            typedefs: Vec::new(),
            type_names: HashSet::new(),
            patches: Vec::new(),
            entities: Vec::new(),
            relationships: Vec::new(),
            guids: HashMap::new(),
        }
    }

    /// Stable GUID for an archive-local id.
    pub fn guid(&mut self, id: &str) -> Guid {
        self.guid_map.guid(id)
    }

    /// A version 1 TypeDef whose GUID comes from the map.
    pub fn new_typedef(&mut self, name: &str, category: TypeDefCategory) -> TypeDef {
        let guid = self.guid(&format!("typedef:{name}"));
        TypeDef::new(guid, name, category)
    }

    /// An entity homed at this archive whose GUID comes from the map.
    pub fn new_entity(&mut self, id: &str, type_name: &str) -> Entity {
        let guid = self.guid(&format!("entity:{id}"));
        Entity::new(guid, type_name, self.properties.home(), self.properties.creation_date_ms)
    }

    pub fn new_relationship(&mut self, id: &str, type_name: &str, end1: &Entity, end2: &Entity) -> Relationship {
        let guid = self.guid(&format!("relationship:{id}"));
        Relationship::new(
            guid,
            type_name,
            self.properties.home(),
            end1.header.guid.clone(),
            end2.header.guid.clone(),
            self.properties.creation_date_ms,
        )
    }

    /// # Errors
    /// [`ArchiveError::DuplicateTypeName`](crate::ArchiveError::DuplicateTypeName)
    /// if a TypeDef of the same name was already added.
    pub fn add_typedef(&mut self, def: TypeDef) -> Result<&mut Self> {
        ensure!(!def.name.contains(' '), BlankTypeNameSnafu { name: def.name.clone() });
        def.validate().context(InvalidContentSnafu)?;
        ensure!(!self.type_names.contains(&def.name), DuplicateTypeNameSnafu { name: def.name.clone() });
        self.claim_guid(&def.guid, format!("typedef {}", def.name))?;
        self.type_names.insert(def.name.clone());
        self.typedefs.push(def);
        Ok(self)
    }

    pub fn add_patch(&mut self, patch: TypeDefPatch) -> &mut Self {
        self.patches.push(patch);
        self
    }

    pub fn add_entity(&mut self, entity: Entity) -> Result<&mut Self> {
        self.claim_guid(&entity.header.guid, format!("entity of type {}", entity.header.type_name))?;
        self.entities.push(entity);
        Ok(self)
    }

    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<&mut Self> {
        self.claim_guid(&relationship.header.guid, format!("relationship of type {}", relationship.header.type_name))?;
        self.relationships.push(relationship);
        Ok(self)
    }

    fn claim_guid(&mut self, guid: &Guid, usage: String) -> Result<()> {
        if let Some(existing) = self.guids.get(guid) {
            return DuplicateGuidSnafu {
                guid: guid.clone(),
                existing: existing.clone(),
            }
            .fail();
        }
        self.guids.insert(guid.clone(), usage);
        Ok(())
    }

    /// The archive, plus the GUID map to save for the next build.
    pub fn build(self) -> (MetadataArchive, ArchiveGuidMap) {
        let archive = MetadataArchive {
            properties: self.properties,
            type_store: ArchiveTypeStore {
                typedefs: self.typedefs,
                patches: self.patches,
            },
            instance_store: ArchiveInstanceStore {
                entities: self.entities,
                relationships: self.relationships,
            },
        };
        (archive, self.guid_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveType;
    use crate::error::ArchiveError;

    fn builder() -> ArchiveBuilder {
        let properties = ArchiveProperties {
            guid: Guid::new("archive-1"),
            name: "core types".to_string(),
            description: String::new(),
            archive_type: ArchiveType::ContentPack,
            originator_name: "tests".to_string(),
            creation_date_ms: 42,
            depends_on: Vec::new(),
        };
        ArchiveBuilder::new(properties, ArchiveGuidMap::new("unused.json"))
    }

    #[test]
    fn test_duplicate_type_names_are_rejected() {
        let mut b = builder();
        let asset = b.new_typedef("Asset", TypeDefCategory::Entity);
        b.add_typedef(asset).unwrap();
        let again = TypeDef::new(Guid::new("other"), "Asset", TypeDefCategory::Entity);
        assert!(matches!(b.add_typedef(again), Err(ArchiveError::DuplicateTypeName { .. })));

        let blank = TypeDef::new(Guid::new("blank"), "Data Set", TypeDefCategory::Entity);
        assert!(matches!(b.add_typedef(blank), Err(ArchiveError::BlankTypeName { .. })));
    }

    #[test]
    fn test_guids_are_unique_across_content() {
        let mut b = builder();
        let e = b.new_entity("db", "Asset");
        b.add_entity(e.clone()).unwrap();
        assert!(matches!(b.add_entity(e), Err(ArchiveError::DuplicateGuid { .. })));
    }

    #[test]
    fn test_instances_are_homed_at_the_archive() {
        let mut b = builder();
        let db = b.new_entity("db", "Asset");
        let table = b.new_entity("table", "Asset");
        let link = b.new_relationship("db-table", "Contains", &db, &table);
        assert_eq!(db.header.home.as_str(), "archive-1");
        assert_eq!(db.header.created_ms, 42);
        assert_eq!(link.end1, db.header.guid);
        assert_eq!(b.new_entity("db", "Asset").header.guid, db.header.guid);

        b.add_entity(db).unwrap();
        b.add_entity(table).unwrap();
        b.add_relationship(link).unwrap();
        let (archive, map) = b.build();
        assert_eq!(archive.instance_store.entities.len(), 2);
        assert_eq!(archive.instance_store.relationships.len(), 1);
        assert_eq!(map.len(), 3);
    }
}
