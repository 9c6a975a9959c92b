//! Connectors that misbehave on purpose.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::RepositoryConnector;
use cohort_core::SaveOutcome;
use cohort_core::SearchCriteria;
use cohort_core::TypeDef;

/// Delays every call by a fixed duration before delegating.
pub struct SlowConnector {
    inner: Arc<dyn RepositoryConnector>,
    delay: Duration,
    calls: AtomicU64,
}

impl SlowConnector {
    pub fn new(inner: Arc<dyn RepositoryConnector>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            calls: AtomicU64::new(0),
        }
    }

    /// Calls started so far, finished or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn pause(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl RepositoryConnector for SlowConnector {
    fn metadata_collection_id(&self) -> &MetadataCollectionId {
        self.inner.metadata_collection_id()
    }

    async fn get_entity(&self, guid: &Guid) -> Result<Option<Entity>, CoreError> {
        self.pause().await;
        self.inner.get_entity(guid).await
    }

    async fn find_entities(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<Entity>, CoreError> {
        self.pause().await;
        self.inner.find_entities(criteria, limit).await
    }

    async fn get_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CoreError> {
        self.pause().await;
        self.inner.get_relationship(guid).await
    }

    async fn get_relationships_for_entity(&self, entity: &Guid) -> Result<Vec<Relationship>, CoreError> {
        self.pause().await;
        self.inner.get_relationships_for_entity(entity).await
    }

    async fn find_relationships(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
    ) -> Result<Vec<Relationship>, CoreError> {
        self.pause().await;
        self.inner.find_relationships(criteria, limit).await
    }

    async fn save_entity(&self, entity: Entity) -> Result<SaveOutcome, CoreError> {
        self.pause().await;
        self.inner.save_entity(entity).await
    }

    async fn save_relationship(&self, relationship: Relationship) -> Result<SaveOutcome, CoreError> {
        self.pause().await;
        self.inner.save_relationship(relationship).await
    }

    async fn remove_entity(&self, guid: &Guid) -> Result<bool, CoreError> {
        self.pause().await;
        self.inner.remove_entity(guid).await
    }

    async fn remove_relationship(&self, guid: &Guid) -> Result<bool, CoreError> {
        self.pause().await;
        self.inner.remove_relationship(guid).await
    }

    async fn notify_supported_typedefs(&self) -> Result<Vec<TypeDef>, CoreError> {
        self.pause().await;
        self.inner.notify_supported_typedefs().await
    }
}

/// Answers every call with [`CoreError::UnreachableMember`].
pub struct FailingConnector {
    metadata_collection_id: MetadataCollectionId,
    calls: AtomicU64,
}

impl FailingConnector {
    pub fn new(metadata_collection_id: MetadataCollectionId) -> Self {
        Self {
            metadata_collection_id,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, CoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(CoreError::UnreachableMember {
            member: self.metadata_collection_id.clone(),
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl RepositoryConnector for FailingConnector {
    fn metadata_collection_id(&self) -> &MetadataCollectionId {
        &self.metadata_collection_id
    }

    async fn get_entity(&self, _guid: &Guid) -> Result<Option<Entity>, CoreError> {
        self.fail()
    }

    async fn find_entities(&self, _criteria: &SearchCriteria, _limit: usize) -> Result<Vec<Entity>, CoreError> {
        self.fail()
    }

    async fn get_relationship(&self, _guid: &Guid) -> Result<Option<Relationship>, CoreError> {
        self.fail()
    }

    async fn get_relationships_for_entity(&self, _entity: &Guid) -> Result<Vec<Relationship>, CoreError> {
        self.fail()
    }

    async fn find_relationships(
        &self,
        _criteria: &SearchCriteria,
        _limit: usize,
    ) -> Result<Vec<Relationship>, CoreError> {
        self.fail()
    }

    async fn save_entity(&self, _entity: Entity) -> Result<SaveOutcome, CoreError> {
        self.fail()
    }

    async fn save_relationship(&self, _relationship: Relationship) -> Result<SaveOutcome, CoreError> {
        self.fail()
    }

    async fn remove_entity(&self, _guid: &Guid) -> Result<bool, CoreError> {
        self.fail()
    }

    async fn remove_relationship(&self, _guid: &Guid) -> Result<bool, CoreError> {
        self.fail()
    }

    async fn notify_supported_typedefs(&self) -> Result<Vec<TypeDef>, CoreError> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use cohort_core::InMemoryRepository;

    use super::*;

    #[tokio::test]
    async fn test_slow_connector_delays_then_delegates() {
        let repo = Arc::new(InMemoryRepository::new("b".into()));
        repo.save_entity(Entity::new(Guid::new("g1"), "Asset", "b".into(), 0)).await.unwrap();
        let slow = SlowConnector::new(repo, Duration::from_millis(50));

        let started = tokio::time::Instant::now();
        let found = slow.get_entity(&Guid::new("g1")).await.unwrap();
        assert!(found.is_some());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_connector_reports_unreachable() {
        let failing = FailingConnector::new("c".into());
        let err = failing.find_entities(&SearchCriteria::all(), 10).await.unwrap_err();
        assert!(matches!(err, CoreError::UnreachableMember { .. }));
        assert_eq!(failing.calls(), 1);
    }
}
