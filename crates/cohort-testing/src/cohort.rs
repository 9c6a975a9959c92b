//! Several members in one process.
//!
//! Members share an [`InMemoryEventBus`], a [`ConnectorDirectory`] and a
//! [`SimulatedTimeProvider`]. Each member gets its own repository, audit
//! store, registry and TypeDef manager; the caller wires whatever else a test
//! needs on top.

use std::sync::Arc;
use std::time::Duration;

use cohort_audit::AuditLog;
use cohort_audit::InMemoryAuditLogStore;
use cohort_core::ConnectionDescriptor;
use cohort_core::CoreError;
use cohort_core::InMemoryRepository;
use cohort_core::MemberRegistration;
use cohort_core::MetadataCollectionId;
use cohort_core::RepositoryConnector;
use cohort_core::SimulatedTimeProvider;
use cohort_core::TimeProvider;
use cohort_events::EventBus;
use cohort_events::EventOriginator;
use cohort_events::EventPublisher;
use cohort_events::InMemoryEventBus;
use cohort_events::RegistryEvent;
use cohort_registry::CohortRegistry;
use cohort_registry::InMemoryRegistryStore;
use cohort_registry::LocalMember;
use cohort_registry::RegistryConfig;
use cohort_typedefs::TypeDefManager;
use tracing::debug;

use crate::directory::ConnectorDirectory;
use crate::directory::IN_MEMORY_CONNECTOR;

/// Simulated clock start for every test cohort.
pub const START_MS: u64 = 1_000_000;

pub struct TestCohort {
    bus: Arc<InMemoryEventBus>,
    directory: ConnectorDirectory,
    time: SimulatedTimeProvider,
}

impl Default for TestCohort {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCohort {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(InMemoryEventBus::new()),
            directory: ConnectorDirectory::new(),
            time: SimulatedTimeProvider::new(START_MS),
        }
    }

    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        self.bus.clone()
    }

    pub fn directory(&self) -> &ConnectorDirectory {
        &self.directory
    }

    pub fn time(&self) -> &SimulatedTimeProvider {
        &self.time
    }

    pub fn clock(&self) -> Arc<dyn TimeProvider> {
        Arc::new(self.time.clone())
    }

    /// Registry timing used by test members: one second refreshes, three
    /// misses to retire, ten seconds of retention.
    pub fn registry_config() -> RegistryConfig {
        RegistryConfig {
            refresh_interval: Duration::from_millis(1_000),
            missed_refreshes_before_retire: 3,
            retention_after_retire: Duration::from_millis(10_000),
            unreachable_alert_threshold: 2,
        }
    }

    /// Create a member whose repository is served in the directory under
    /// its own id.
    pub async fn add_member(&self, id: &str) -> Result<TestMember, CoreError> {
        let metadata_collection_id = MetadataCollectionId::new(id);
        let repo = Arc::new(InMemoryRepository::new(metadata_collection_id.clone()));
        self.directory.insert(id, repo.clone());

        let clock = self.clock();
        let audit_store = Arc::new(InMemoryAuditLogStore::new());
        let audit = AuditLog::new(
            format!("server-{id}"),
            metadata_collection_id.clone(),
            vec![audit_store.clone()],
            clock.clone(),
        );
        let publisher = EventPublisher::new(self.bus.clone() as Arc<dyn EventBus>, originator(id), clock.clone());
        let local = LocalMember {
            metadata_collection_id: metadata_collection_id.clone(),
            server_name: format!("server-{id}"),
            connection: ConnectionDescriptor::new(IN_MEMORY_CONNECTOR, id),
        };
        let registry = CohortRegistry::open(
            local,
            Self::registry_config(),
            Arc::new(InMemoryRegistryStore::new()),
            publisher.clone(),
            &audit,
            clock,
        )
        .await?;
        let typedefs = TypeDefManager::new(publisher.clone(), &audit);
        debug!(member = id, "test member created");

        Ok(TestMember {
            id: metadata_collection_id,
            repo,
            audit,
            audit_store,
            publisher,
            registry: Arc::new(registry),
            typedefs: Arc::new(typedefs),
        })
    }
}

pub struct TestMember {
    pub id: MetadataCollectionId,
    pub repo: Arc<InMemoryRepository>,
    pub audit: AuditLog,
    pub audit_store: Arc<InMemoryAuditLogStore>,
    pub publisher: EventPublisher,
    pub registry: Arc<CohortRegistry>,
    pub typedefs: Arc<TypeDefManager>,
}

impl TestMember {
    pub fn connector(&self) -> Arc<dyn RepositoryConnector> {
        self.repo.clone()
    }

    /// Make `other` an active member of this member's registry, reachable at
    /// the directory endpoint of the same name.
    pub async fn admit(&self, other: &str) -> Result<(), CoreError> {
        self.admit_with(other, ConnectionDescriptor::new(IN_MEMORY_CONNECTOR, other)).await
    }

    pub async fn admit_with(&self, other: &str, connection: ConnectionDescriptor) -> Result<(), CoreError> {
        let registration =
            MemberRegistration::new(other.into(), format!("server-{other}"), connection, self.publisher.now_ms());
        let from = originator(other);
        self.registry
            .process_remote_registry_event(&from, &RegistryEvent::Registration {
                registration: registration.clone(),
            })
            .await?;
        self.registry.process_remote_registry_event(&from, &RegistryEvent::ReRegistration { registration }).await
    }

    /// Audit records written by this member with `message_id`.
    pub fn audit_count(&self, message_id: &str) -> usize {
        self.audit_store.records_with_message_id(message_id).len()
    }
}

pub fn originator(id: &str) -> EventOriginator {
    EventOriginator {
        metadata_collection_id: id.into(),
        server_name: format!("server-{id}"),
    }
}

#[cfg(test)]
mod tests {
    use cohort_core::MemberState;

    use super::*;

    #[tokio::test]
    async fn test_admitted_member_is_active() {
        let cohort = TestCohort::new();
        let a = cohort.add_member("a").await.unwrap();
        a.admit("b").await.unwrap();

        let b = a.registry.get_member(&"b".into()).unwrap();
        assert_eq!(b.state, MemberState::Active);
        assert_eq!(a.registry.get_fanout_members().len(), 1);
    }
}
