//! In-memory repository.
//!
//! Backs the node binary and the tests. It is a map behind a lock, not a
//! storage engine: contents are lost when the process exits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::connector::RepositoryConnector;
use crate::connector::SaveOutcome;
use crate::error::CoreError;
use crate::ids::Guid;
use crate::ids::MetadataCollectionId;
use crate::instance::Entity;
use crate::instance::Instance;
use crate::instance::Relationship;
use crate::instance::SearchCriteria;
use crate::typedef::TypeDef;

/// Conditional insert shared by entities and relationships.
fn save_if_newer<T: Instance>(map: &RwLock<BTreeMap<Guid, T>>, incoming: T) -> SaveOutcome {
    let mut map = map.write();
    if let Some(stored) = map.get(incoming.guid()) {
        if stored.version() >= incoming.version() {
            return SaveOutcome::Stale {
                stored_version: stored.version(),
            };
        }
    }
    map.insert(incoming.guid().clone(), incoming);
    SaveOutcome::Applied
}

/// A repository held entirely in memory.
pub struct InMemoryRepository {
    metadata_collection_id: MetadataCollectionId,
    entities: RwLock<BTreeMap<Guid, Entity>>,
    relationships: RwLock<BTreeMap<Guid, Relationship>>,
    supported_typedefs: RwLock<Vec<TypeDef>>,
}

impl InMemoryRepository {
    pub fn new(metadata_collection_id: MetadataCollectionId) -> Self {
        Self {
            metadata_collection_id,
            entities: RwLock::new(BTreeMap::new()),
            relationships: RwLock::new(BTreeMap::new()),
            supported_typedefs: RwLock::new(Vec::new()),
        }
    }

    /// Declare TypeDefs reported by `notify_supported_typedefs`.
    pub fn with_typedefs(self, typedefs: Vec<TypeDef>) -> Self {
        *self.supported_typedefs.write() = typedefs;
        self
    }

    /// All stored entities ordered by GUID.
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.read().values().cloned().collect()
    }

    /// All stored relationships ordered by GUID.
    pub fn relationships(&self) -> Vec<Relationship> {
        self.relationships.read().values().cloned().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }
}

#[async_trait]
impl RepositoryConnector for InMemoryRepository {
    fn metadata_collection_id(&self) -> &MetadataCollectionId {
        &self.metadata_collection_id
    }

    async fn get_entity(&self, guid: &Guid) -> Result<Option<Entity>, CoreError> {
        Ok(self.entities.read().get(guid).cloned())
    }

    async fn find_entities(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<Entity>, CoreError> {
        let mut found: Vec<Entity> =
            self.entities.read().values().filter(|e| criteria.matches_entity(e)).cloned().collect();
        criteria.sequencing.sort(&mut found);
        found.truncate(limit);
        Ok(found)
    }

    async fn get_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CoreError> {
        Ok(self.relationships.read().get(guid).cloned())
    }

    async fn get_relationships_for_entity(&self, entity: &Guid) -> Result<Vec<Relationship>, CoreError> {
        Ok(self.relationships.read().values().filter(|r| r.touches(entity)).cloned().collect())
    }

    async fn find_relationships(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
    ) -> Result<Vec<Relationship>, CoreError> {
        let mut found: Vec<Relationship> =
            self.relationships.read().values().filter(|r| criteria.matches_relationship(r)).cloned().collect();
        criteria.sequencing.sort(&mut found);
        found.truncate(limit);
        Ok(found)
    }

    async fn save_entity(&self, entity: Entity) -> Result<SaveOutcome, CoreError> {
        Ok(save_if_newer(&self.entities, entity))
    }

    async fn save_relationship(&self, relationship: Relationship) -> Result<SaveOutcome, CoreError> {
        Ok(save_if_newer(&self.relationships, relationship))
    }

    async fn remove_entity(&self, guid: &Guid) -> Result<bool, CoreError> {
        Ok(self.entities.write().remove(guid).is_some())
    }

    async fn remove_relationship(&self, guid: &Guid) -> Result<bool, CoreError> {
        Ok(self.relationships.write().remove(guid).is_some())
    }

    async fn notify_supported_typedefs(&self) -> Result<Vec<TypeDef>, CoreError> {
        Ok(self.supported_typedefs.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new("local".into())
    }

    #[tokio::test]
    async fn test_save_is_conditional_on_version() {
        let repo = repo();
        let v1 = Entity::new(Guid::new("g1"), "Asset", "remote".into(), 0);
        let v2 = v1.clone().with_version(2).with_property("name", "two");

        assert_eq!(repo.save_entity(v2.clone()).await.unwrap(), SaveOutcome::Applied);
        assert_eq!(repo.save_entity(v1).await.unwrap(), SaveOutcome::Stale { stored_version: 2 });
        assert_eq!(repo.save_entity(v2.clone()).await.unwrap(), SaveOutcome::Stale { stored_version: 2 });
        assert_eq!(repo.get_entity(&Guid::new("g1")).await.unwrap(), Some(v2));
    }

    #[tokio::test]
    async fn test_find_applies_criteria_order_and_limit() {
        let repo = repo();
        for guid in ["c", "a", "b"] {
            repo.save_entity(Entity::new(Guid::new(guid), "Asset", "local".into(), 0)).await.unwrap();
        }
        repo.save_entity(Entity::new(Guid::new("p"), "Process", "local".into(), 0)).await.unwrap();

        let found = repo.find_entities(&SearchCriteria::of_type("Asset"), 2).await.unwrap();
        let guids: Vec<_> = found.iter().map(|e| e.header.guid.as_str()).collect();
        assert_eq!(guids, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_relationships_for_entity() {
        let repo = repo();
        let r = Relationship::new(Guid::new("r1"), "Owns", "local".into(), Guid::new("a"), Guid::new("b"), 0);
        repo.save_relationship(r).await.unwrap();

        assert_eq!(repo.get_relationships_for_entity(&Guid::new("b")).await.unwrap().len(), 1);
        assert!(repo.get_relationships_for_entity(&Guid::new("c")).await.unwrap().is_empty());
        assert!(repo.remove_relationship(&Guid::new("r1")).await.unwrap());
        assert!(!repo.remove_relationship(&Guid::new("r1")).await.unwrap());
    }
}
