//! Cohort nodes running together on one in-process event bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use cohort::CohortNode;
use cohort::NodeConfig;
use cohort::config::ConnectionSection;
use cohort::config::FederationSection;
use cohort::config::RegistrySection;
use cohort_archive::ArchiveBuilder;
use cohort_archive::ArchiveGuidMap;
use cohort_archive::ArchiveProperties;
use cohort_archive::ArchiveType;
use cohort_archive::write_archive_file;
use cohort_audit::AuditFilter;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::InMemoryRepository;
use cohort_core::MemberState;
use cohort_core::MetadataCollectionId;
use cohort_core::RepositoryConnector;
use cohort_core::SearchCriteria;
use cohort_core::TypeDef;
use cohort_core::TypeDefAttribute;
use cohort_core::TypeDefCategory;
use cohort_core::TypeDefPatch;
use cohort_events::InstanceEvent;
use cohort_federation::ConnectorFactoryTable;
use cohort_federation::MemberOutcome;
use cohort_replication::ReplicationOutcome;
use cohort_testing::IN_MEMORY_CONNECTOR;
use cohort_testing::SlowConnector;
use cohort_testing::TestCohort;
use cohort_testing::originator;
use cohort_testing::wait_until;

// ============================================================================
// Test Helpers
// ============================================================================

/// Long enough that background refresh loops never tick during a test;
/// liveness is driven through the simulated clock instead.
const REFRESH_MS: u64 = 60_000;
const RETENTION_SECS: u64 = 600;
const MEMBER_TIMEOUT_MS: u64 = 300;
const SETTLE: Duration = Duration::from_secs(5);

struct Harness {
    cohort: TestCohort,
    dir: tempfile::TempDir,
}

struct Member {
    node: CohortNode,
    repo: Arc<InMemoryRepository>,
}

impl Harness {
    fn new() -> Self {
        Self {
            cohort: TestCohort::new(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self, id: &str) -> NodeConfig {
        NodeConfig {
            server_name: format!("server-{id}"),
            metadata_collection_id: Some(id.into()),
            data_dir: Some(self.dir.path().join(id)),
            connection: ConnectionSection {
                connector_type: IN_MEMORY_CONNECTOR.to_string(),
                endpoint: id.to_string(),
                ..ConnectionSection::default()
            },
            registry: RegistrySection {
                refresh_interval_ms: REFRESH_MS,
                missed_refreshes_before_retire: 3,
                retention_after_retire_secs: RETENTION_SECS,
                ..RegistrySection::default()
            },
            federation: FederationSection {
                member_timeout_ms: MEMBER_TIMEOUT_MS,
                ..FederationSection::default()
            },
            ..NodeConfig::default()
        }
    }

    async fn start(&self, id: &str) -> Member {
        self.start_with(self.config(id), Arc::new(InMemoryRepository::new(id.into()))).await
    }

    async fn start_with(&self, config: NodeConfig, repo: Arc<InMemoryRepository>) -> Member {
        let id = repo.metadata_collection_id().to_string();
        self.cohort.directory().insert(id, repo.clone());
        let factories = ConnectorFactoryTable::new().with(IN_MEMORY_CONNECTOR, self.cohort.directory().factory());
        let node = CohortNode::start_with_time(config, self.cohort.bus(), repo.clone(), factories, self.cohort.clock())
            .await
            .unwrap();
        Member { node, repo }
    }
}

/// Refresh every member until each sees all the others as active.
async fn settle(members: &[&Member]) {
    let settled = wait_until(SETTLE, || async move {
        for m in members {
            m.node.registry().refresh_local().await.unwrap();
        }
        members.iter().all(|m| {
            let active = m.node.registry().get_active_members();
            members
                .iter()
                .filter(|other| other.node.local_id() != m.node.local_id())
                .all(|other| active.iter().any(|r| &r.metadata_collection_id == other.node.local_id()))
        })
    })
    .await;
    assert!(settled, "members did not become active");
}

fn asset(guid: &str, home: &str) -> Entity {
    Entity::new(Guid::new(guid), "Asset", home.into(), 0).with_property("qualifiedName", guid)
}

fn asset_type(guid: &str) -> TypeDef {
    TypeDef::new(Guid::new(guid), "Asset", TypeDefCategory::Entity)
        .with_attribute(TypeDefAttribute::new("qualifiedName", "string"))
}

async fn holds(repo: &InMemoryRepository, guid: &Guid) -> bool {
    repo.get_entity(guid).await.unwrap().is_some()
}

fn guids(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.header.guid.as_str()).collect()
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_nodes_discover_each_other_and_leave() {
    let h = Harness::new();
    let a = h.start("a").await;
    let b = h.start("b").await;
    settle(&[&a, &b]).await;

    b.node.shutdown().await;
    let b_id = &MetadataCollectionId::new("b");
    let registry = a.node.registry();
    let left = wait_until(SETTLE, || async move {
        registry.get_member(b_id).is_some_and(|m| m.state == MemberState::Retired)
    })
    .await;
    assert!(left);
    assert!(a.node.registry().get_fanout_members().is_empty());
    a.node.shutdown().await;
}

#[tokio::test]
async fn test_missed_refreshes_retire_member_and_audit_stays_queryable() {
    let h = Harness::new();
    let a = h.start("a").await;
    let b = h.start("b").await;
    settle(&[&a, &b]).await;

    let copy = b.node.instances().create_entity(asset("g-b", "b")).await.unwrap();
    let (repo, guid) = (&a.repo, &copy.header.guid);
    assert!(wait_until(SETTLE, || async move { holds(repo, guid).await }).await);

    // b stops refreshing; three missed intervals retire it.
    h.cohort.time().advance_ms(3 * REFRESH_MS + REFRESH_MS / 2 + 1);
    let changes = a.node.registry().sweep().await;
    assert!(changes.contains(&(MetadataCollectionId::new("b"), MemberState::Retired)));
    assert!(a.node.registry().get_fanout_members().is_empty());

    let result = a.node.federation().federated_find(&SearchCriteria::all(), 100).await.unwrap();
    assert_eq!(result.responded, vec![MetadataCollectionId::new("a")]);
    assert!(result.manifest.is_empty());

    let records = a.node.audit_store().query(&AuditFilter::time_range(0, u64::MAX), 0, 1000).await.unwrap();
    let retirement = cohort_registry::audit_codes::MEMBER_RETIRED_MISSED_REFRESHES.message_id;
    assert_eq!(records.iter().filter(|r| r.message_id == retirement).count(), 1);

    // Reference copies go once retention expires; the registration stays.
    assert_eq!(a.node.sweep_retention().await, 0);
    h.cohort.time().advance_ms(RETENTION_SECS * 1000);
    assert_eq!(a.node.sweep_retention().await, 1);
    assert!(!holds(&a.repo, &copy.header.guid).await);
    assert!(a.node.registry().get_member(&"b".into()).is_some());
    assert_eq!(a.node.sweep_retention().await, 0);

    a.node.shutdown().await;
    b.node.shutdown().await;
}

// ============================================================================
// Replication and federation
// ============================================================================

#[tokio::test]
async fn test_replayed_instance_event_changes_nothing() {
    let h = Harness::new();
    let a = h.start("a").await;
    let b = h.start("b").await;
    settle(&[&a, &b]).await;

    let entity = a.node.instances().create_entity(asset("g-1", "a")).await.unwrap();
    let (repo, guid) = (&b.repo, &entity.header.guid);
    assert!(wait_until(SETTLE, || async move { holds(repo, guid).await }).await);
    let before = b.repo.entities();
    assert_eq!(before, vec![entity.clone()]);

    let event = InstanceEvent::NewEntity { entity };
    for _ in 0..2 {
        let outcome = b.node.replication().process_event(&originator("a"), &event).await.unwrap();
        assert_eq!(outcome, ReplicationOutcome::Stale);
    }
    assert_eq!(b.repo.entities(), before);

    a.node.shutdown().await;
    b.node.shutdown().await;
}

#[tokio::test]
async fn test_federated_find_returns_each_guid_once_with_home_copy() {
    let h = Harness::new();
    let a = h.start("a").await;
    let b = h.start("b").await;
    settle(&[&a, &b]).await;

    let from_a = a.node.instances().create_entity(asset("g-1", "a")).await.unwrap();
    let from_b = b.node.instances().create_entity(asset("g-2", "b")).await.unwrap();
    let (repo_a, repo_b) = (&a.repo, &b.repo);
    let (g1, g2) = (&from_a.header.guid, &from_b.header.guid);
    assert!(wait_until(SETTLE, || async move { holds(repo_b, g1).await && holds(repo_a, g2).await }).await);

    // A diverged reference copy at a higher version loses to the home copy.
    let diverged = from_a.clone().with_version(7).with_property("qualifiedName", "diverged");
    b.repo.save_entity(diverged).await.unwrap();

    let result = b.node.federation().federated_find(&SearchCriteria::of_type("Asset"), 100).await.unwrap();
    assert!(result.is_complete());
    assert_eq!(guids(&result.instances), vec!["g-1", "g-2"]);
    assert_eq!(result.instances[0], from_a);
    assert_eq!(result.instances[1], from_b);

    a.node.shutdown().await;
    b.node.shutdown().await;
}

#[tokio::test]
async fn test_slow_member_is_named_in_manifest() {
    let h = Harness::new();
    let a = h.start("a").await;
    let b = h.start("b").await;
    let c = h.start("c").await;
    settle(&[&a, &b, &c]).await;

    a.node.instances().create_entity(asset("g-a", "a")).await.unwrap();
    b.node.instances().create_entity(asset("g-b", "b")).await.unwrap();
    c.node.instances().create_entity(asset("g-c", "c")).await.unwrap();
    let slow = SlowConnector::new(b.repo.clone(), Duration::from_secs(10));
    h.cohort.directory().insert("b", Arc::new(slow));

    let started = Instant::now();
    let result = a.node.federation().federated_find(&SearchCriteria::of_type("Asset"), 100).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(MEMBER_TIMEOUT_MS + 700));

    assert_eq!(result.outcome_of(&"b".into()), Some(MemberOutcome::TimedOut));
    assert_eq!(result.responded, vec![MetadataCollectionId::new("a"), MetadataCollectionId::new("c")]);
    let found = guids(&result.instances);
    assert!(found.contains(&"g-a"));
    assert!(found.contains(&"g-c"));

    a.node.shutdown().await;
    b.node.shutdown().await;
    c.node.shutdown().await;
}

// ============================================================================
// TypeDefs
// ============================================================================

#[tokio::test]
async fn test_conflicting_typedef_is_detected_once() {
    let h = Harness::new();
    let a_repo = Arc::new(InMemoryRepository::new("a".into()).with_typedefs(vec![asset_type("asset-a")]));
    let b_repo = Arc::new(InMemoryRepository::new("b".into()).with_typedefs(vec![asset_type("asset-b")]));
    let a = h.start_with(h.config("a"), a_repo).await;
    let b = h.start_with(h.config("b"), b_repo).await;

    let typedefs = a.node.typedefs();
    assert!(wait_until(SETTLE, || async move { typedefs.list_conflicts().len() == 1 }).await);
    // Let any duplicate announcement land before counting.
    settle(&[&a, &b]).await;

    let conflict = cohort_typedefs::audit_codes::TYPEDEF_CONFLICT.message_id;
    assert_eq!(a.node.recent_audit().records_with_message_id(conflict).len(), 1);
    assert_eq!(a.node.typedefs().get_typedef("Asset").map(|d| d.guid), Some(Guid::new("asset-a")));
    assert!(a.node.typedefs().is_excluded("Asset"));
    assert_eq!(a.node.typedefs().list_conflicts()[0].originator, MetadataCollectionId::new("b"));

    a.node.shutdown().await;
    b.node.shutdown().await;
}

#[tokio::test]
async fn test_patches_apply_in_order_and_reach_the_cohort() {
    let h = Harness::new();
    let a_repo = Arc::new(InMemoryRepository::new("a".into()).with_typedefs(vec![asset_type("asset-a")]));
    let a = h.start_with(h.config("a"), a_repo).await;
    let b = h.start("b").await;
    let original = a.node.typedefs().get_typedef("Asset").unwrap();

    let skipping = TypeDefPatch::new("Asset", 2).add_attribute(TypeDefAttribute::new("owner", "string"));
    let err = a.node.typedefs().apply_patch(&skipping).await.unwrap_err();
    assert!(matches!(err, CoreError::VersionMismatch { .. }));
    assert_eq!(a.node.typedefs().get_typedef("Asset"), Some(original));

    let v2 = a
        .node
        .typedefs()
        .apply_patch(&TypeDefPatch::new("Asset", 1).add_attribute(TypeDefAttribute::new("zone", "string")))
        .await
        .unwrap();
    assert_eq!(v2.version, 2);
    let v3 = a.node.typedefs().apply_patch(&skipping).await.unwrap();
    assert_eq!(v3.version, 3);

    let typedefs = b.node.typedefs();
    let upgraded =
        wait_until(SETTLE, || async move { typedefs.get_typedef("Asset").is_some_and(|d| d.version == 3) }).await;
    assert!(upgraded);
    assert_eq!(b.node.typedefs().get_typedef("Asset"), Some(v3));

    a.node.shutdown().await;
    b.node.shutdown().await;
}

// ============================================================================
// Archives
// ============================================================================

async fn write_content_pack(dir: &std::path::Path) -> PathBuf {
    let properties = ArchiveProperties {
        guid: Guid::new("archive-core"),
        name: "core content".to_string(),
        description: "types and reference data".to_string(),
        archive_type: ArchiveType::ContentPack,
        originator_name: "metadata team".to_string(),
        creation_date_ms: 5_000,
        depends_on: Vec::new(),
    };
    let mut b = ArchiveBuilder::new(properties, ArchiveGuidMap::new(dir.join("guids.json")));
    let asset = b
        .new_typedef("Asset", TypeDefCategory::Entity)
        .with_attribute(TypeDefAttribute::new("qualifiedName", "string"));
    b.add_typedef(asset).unwrap();
    b.add_patch(TypeDefPatch::new("Asset", 1).add_attribute(TypeDefAttribute::new("zone", "string")));
    let db = b.new_entity("db", "Asset").with_property("qualifiedName", "db");
    b.add_entity(db).unwrap();

    let path = dir.join("core.json");
    write_archive_file(&path, &b.build().0).await.unwrap();
    path
}

#[tokio::test]
async fn test_startup_archive_load_is_idempotent() {
    let h = Harness::new();
    let path = write_content_pack(h.dir.path()).await;
    let config = NodeConfig {
        archives: vec![path.clone()],
        ..h.config("a")
    };
    let repo = Arc::new(InMemoryRepository::new("a".into()));
    let a = h.start_with(config.clone(), repo.clone()).await;

    let snapshot = |node: &CohortNode| (node.typedefs().list_typedefs(), repo.entities(), repo.relationships());
    let after_start = snapshot(&a.node);
    assert_eq!(after_start.1.len(), 1);
    assert_eq!(a.node.typedefs().get_typedef("Asset").map(|d| d.version), Some(2));

    let report = a.node.archive_loader().load_archive_file(&path).await.unwrap();
    assert!(!report.changed_anything());
    assert_eq!(snapshot(&a.node), after_start);
    a.node.shutdown().await;

    // A restart over the same repository loads the archive again to no effect.
    let a = h.start_with(config, repo.clone()).await;
    assert_eq!(snapshot(&a.node), after_start);
    let loaded = cohort_archive::audit_codes::LOAD_COMPLETED.message_id;
    assert_eq!(a.node.recent_audit().records_with_message_id(loaded).len(), 1);
    a.node.shutdown().await;
}

#[tokio::test]
async fn test_node_refuses_mismatched_local_repository() {
    let h = Harness::new();
    let cohort = &h.cohort;
    let err = CohortNode::start_with_time(
        h.config("a"),
        cohort.bus(),
        Arc::new(InMemoryRepository::new("somebody-else".into())),
        ConnectorFactoryTable::new(),
        cohort.clock(),
    )
    .await
    .err()
    .unwrap();
    assert!(err.to_string().contains("somebody-else"));
}
