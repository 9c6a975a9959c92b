//! Per-kind access shared by entities and relationships.

use std::fmt;

use async_trait::async_trait;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::Instance;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::RepositoryConnector;
use cohort_core::SaveOutcome;
use cohort_events::InstanceEvent;

/// Instance kind handled by replication.
#[async_trait]
pub(crate) trait Replica: Instance + fmt::Debug {
    const KIND: &'static str;

    async fn fetch(store: &dyn RepositoryConnector, guid: &Guid) -> Result<Option<Self>, CoreError>;

    async fn store(store: &dyn RepositoryConnector, instance: Self) -> Result<SaveOutcome, CoreError>;

    async fn discard(store: &dyn RepositoryConnector, guid: &Guid) -> Result<bool, CoreError>;

    fn created(self) -> InstanceEvent;

    fn updated(self) -> InstanceEvent;

    fn deleted(self) -> InstanceEvent;

    fn refreshed(self) -> InstanceEvent;

    fn purged(guid: Guid, type_name: String, home: MetadataCollectionId) -> InstanceEvent;

    fn refresh_request(guid: Guid, type_name: String, home: MetadataCollectionId) -> InstanceEvent;
}

#[async_trait]
impl Replica for Entity {
    const KIND: &'static str = "entity";

    async fn fetch(store: &dyn RepositoryConnector, guid: &Guid) -> Result<Option<Self>, CoreError> {
        store.get_entity(guid).await
    }

    async fn store(store: &dyn RepositoryConnector, instance: Self) -> Result<SaveOutcome, CoreError> {
        store.save_entity(instance).await
    }

    async fn discard(store: &dyn RepositoryConnector, guid: &Guid) -> Result<bool, CoreError> {
        store.remove_entity(guid).await
    }

    fn created(self) -> InstanceEvent {
        InstanceEvent::NewEntity { entity: self }
    }

    fn updated(self) -> InstanceEvent {
        InstanceEvent::UpdatedEntity { entity: self }
    }

    fn deleted(self) -> InstanceEvent {
        InstanceEvent::DeletedEntity { entity: self }
    }

    fn refreshed(self) -> InstanceEvent {
        InstanceEvent::RefreshedEntity { entity: self }
    }

    fn purged(guid: Guid, type_name: String, home: MetadataCollectionId) -> InstanceEvent {
        InstanceEvent::PurgedEntity { guid, type_name, home }
    }

    fn refresh_request(guid: Guid, type_name: String, home: MetadataCollectionId) -> InstanceEvent {
        InstanceEvent::RefreshEntityRequest { guid, type_name, home }
    }
}

#[async_trait]
impl Replica for Relationship {
    const KIND: &'static str = "relationship";

    async fn fetch(store: &dyn RepositoryConnector, guid: &Guid) -> Result<Option<Self>, CoreError> {
        store.get_relationship(guid).await
    }

    async fn store(store: &dyn RepositoryConnector, instance: Self) -> Result<SaveOutcome, CoreError> {
        store.save_relationship(instance).await
    }

    async fn discard(store: &dyn RepositoryConnector, guid: &Guid) -> Result<bool, CoreError> {
        store.remove_relationship(guid).await
    }

    fn created(self) -> InstanceEvent {
        InstanceEvent::NewRelationship { relationship: self }
    }

    fn updated(self) -> InstanceEvent {
        InstanceEvent::UpdatedRelationship { relationship: self }
    }

    fn deleted(self) -> InstanceEvent {
        InstanceEvent::DeletedRelationship { relationship: self }
    }

    fn refreshed(self) -> InstanceEvent {
        InstanceEvent::RefreshedRelationship { relationship: self }
    }

    fn purged(guid: Guid, type_name: String, home: MetadataCollectionId) -> InstanceEvent {
        InstanceEvent::PurgedRelationship { guid, type_name, home }
    }

    fn refresh_request(guid: Guid, type_name: String, home: MetadataCollectionId) -> InstanceEvent {
        InstanceEvent::RefreshRelationshipRequest { guid, type_name, home }
    }
}
