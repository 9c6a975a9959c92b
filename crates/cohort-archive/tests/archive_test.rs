//! Archive build and load tests.

use std::sync::Arc;

use cohort_archive::ArchiveBuilder;
use cohort_archive::ArchiveGuidMap;
use cohort_archive::ArchiveLoader;
use cohort_archive::ArchiveProperties;
use cohort_archive::ArchiveType;
use cohort_archive::LoadReport;
use cohort_archive::MetadataArchive;
use cohort_archive::audit_codes;
use cohort_archive::read_archive_file;
use cohort_archive::write_archive_file;
use cohort_audit::AuditLog;
use cohort_audit::InMemoryAuditLogStore;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::InMemoryRepository;
use cohort_core::RepositoryConnector;
use cohort_core::SimulatedTimeProvider;
use cohort_core::TimeProvider;
use cohort_core::TypeDef;
use cohort_core::TypeDefAttribute;
use cohort_core::TypeDefCategory;
use cohort_core::TypeDefPatch;
use cohort_events::EventBus;
use cohort_events::EventOriginator;
use cohort_events::EventPublisher;
use cohort_events::InMemoryEventBus;
use cohort_typedefs::TypeDefManager;

// ============================================================================
// Test Helpers
// ============================================================================

struct Fixture {
    repo: Arc<InMemoryRepository>,
    typedefs: Arc<TypeDefManager>,
    loader: ArchiveLoader,
    audit_store: Arc<InMemoryAuditLogStore>,
}

fn fixture() -> Fixture {
    let clock: Arc<dyn TimeProvider> = Arc::new(SimulatedTimeProvider::new(10_000));
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let audit_store = Arc::new(InMemoryAuditLogStore::new());
    let audit = AuditLog::new("server-local", "local".into(), vec![audit_store.clone()], clock.clone());
    let originator = EventOriginator {
        metadata_collection_id: "local".into(),
        server_name: "server-local".to_string(),
    };
    let typedefs = Arc::new(TypeDefManager::new(EventPublisher::new(bus, originator, clock), &audit));
    let repo = Arc::new(InMemoryRepository::new("local".into()));
    let loader = ArchiveLoader::new(repo.clone(), typedefs.clone(), &audit);
    Fixture {
        repo,
        typedefs,
        loader,
        audit_store,
    }
}

fn properties() -> ArchiveProperties {
    ArchiveProperties {
        guid: Guid::new("archive-core"),
        name: "core content".to_string(),
        description: "types and reference data".to_string(),
        archive_type: ArchiveType::ContentPack,
        originator_name: "metadata team".to_string(),
        creation_date_ms: 5_000,
        depends_on: Vec::new(),
    }
}

/// Asset and Process types, a patch adding `zone` to Asset, three entities
/// and one relationship.
fn content_pack() -> MetadataArchive {
    let mut b = ArchiveBuilder::new(properties(), ArchiveGuidMap::new("unused.json"));
    let asset = b
        .new_typedef("Asset", TypeDefCategory::Entity)
        .with_attribute(TypeDefAttribute::new("qualifiedName", "string").required());
    let process = b.new_typedef("Process", TypeDefCategory::Entity);
    b.add_typedef(asset).unwrap();
    b.add_typedef(process).unwrap();
    b.add_patch(TypeDefPatch::new("Asset", 1).add_attribute(TypeDefAttribute::new("zone", "string")));

    let db = b.new_entity("db", "Asset").with_property("qualifiedName", "db");
    let table = b.new_entity("table", "Asset").with_property("qualifiedName", "db.table");
    let etl = b.new_entity("etl", "Process");
    let link = b.new_relationship("etl-table", "ProcessOutput", &etl, &table);
    b.add_entity(db).unwrap();
    b.add_entity(table).unwrap();
    b.add_entity(etl).unwrap();
    b.add_relationship(link).unwrap();
    b.build().0
}

type Snapshot = (Vec<TypeDef>, Vec<Entity>, Vec<cohort_core::Relationship>);

fn snapshot(f: &Fixture) -> Snapshot {
    (f.typedefs.list_typedefs(), f.repo.entities(), f.repo.relationships())
}

fn audit_count(f: &Fixture, message_id: &str) -> usize {
    f.audit_store.records_with_message_id(message_id).len()
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_second_load_changes_nothing() {
    let f = fixture();
    let archive = content_pack();

    let first = f.loader.load_archive(&archive).await.unwrap();
    assert_eq!(first, LoadReport {
        typedefs_adopted: 2,
        patches_applied: 1,
        entities_inserted: 3,
        relationships_inserted: 1,
        ..LoadReport::default()
    });
    let after_one = snapshot(&f);
    assert_eq!(f.typedefs.get_typedef("Asset").unwrap().version, 2);

    let second = f.loader.load_archive(&archive).await.unwrap();
    assert!(!second.changed_anything());
    assert_eq!(second.typedefs_unchanged, 2);
    assert_eq!(second.patches_skipped, 1);
    assert_eq!(second.entities_skipped, 3);
    assert_eq!(second.relationships_skipped, 1);
    assert_eq!(snapshot(&f), after_one);

    assert_eq!(audit_count(&f, audit_codes::LOAD_STARTED.message_id), 2);
    assert_eq!(audit_count(&f, audit_codes::LOAD_COMPLETED.message_id), 2);
}

#[tokio::test]
async fn test_instances_are_homed_at_the_archive() {
    let f = fixture();
    f.loader.load_archive(&content_pack()).await.unwrap();

    let entities = f.repo.entities();
    assert_eq!(entities.len(), 3);
    assert!(entities.iter().all(|e| e.header.home.as_str() == "archive-core" && e.header.version == 1));
}

#[tokio::test]
async fn test_newer_local_copy_is_kept() {
    let f = fixture();
    let archive = content_pack();
    let archived = archive.instance_store.entities[0].clone();
    let newer = archived.clone().with_version(4).with_property("qualifiedName", "renamed");
    f.repo.save_entity(newer.clone()).await.unwrap();

    let report = f.loader.load_archive(&archive).await.unwrap();
    assert_eq!(report.entities_inserted, 2);
    assert_eq!(report.entities_skipped, 1);
    assert_eq!(f.repo.get_entity(&archived.header.guid).await.unwrap(), Some(newer));
}

#[tokio::test]
async fn test_conflicting_typedef_is_counted_and_its_instances_skipped() {
    let f = fixture();
    let held = TypeDef::new(Guid::new("someone-elses-asset"), "Asset", TypeDefCategory::Entity);
    f.typedefs.add_local_typedef(held.clone()).await.unwrap();

    let report = f.loader.load_archive(&content_pack()).await.unwrap();
    assert_eq!(report.typedefs_conflicted, 1);
    assert_eq!(report.typedefs_adopted, 1);
    assert_eq!(report.entities_inserted, 1);
    assert_eq!(report.entities_skipped, 2);
    assert_eq!(f.typedefs.get_typedef("Asset"), Some(held));
    assert!(f.typedefs.is_excluded("Asset"));
    assert_eq!(audit_count(&f, audit_codes::TYPEDEF_REJECTED.message_id), 1);
}

#[tokio::test]
async fn test_patches_apply_in_version_order() {
    let f = fixture();
    let mut archive = content_pack();
    archive.type_store.patches = vec![
        TypeDefPatch::new("Asset", 2).add_attribute(TypeDefAttribute::new("owner", "string")),
        TypeDefPatch::new("Asset", 1).add_attribute(TypeDefAttribute::new("zone", "string")),
        TypeDefPatch::new("Missing", 1).add_attribute(TypeDefAttribute::new("x", "string")),
    ];

    let report = f.loader.load_archive(&archive).await.unwrap();
    assert_eq!(report.patches_applied, 1);
    assert_eq!(report.patches_skipped, 2);
    let asset = f.typedefs.get_typedef("Asset").unwrap();
    assert_eq!(asset.version, 2);
    assert!(asset.attribute("zone").is_some());
    assert!(asset.attribute("owner").is_none());
    assert_eq!(audit_count(&f, audit_codes::PATCH_NOT_APPLIED.message_id), 2);

    // Now in order, the v2 patch applies; the v1 patch is already applied.
    let report = f.loader.load_archive(&archive).await.unwrap();
    assert_eq!(report.patches_applied, 1);
    assert_eq!(f.typedefs.get_typedef("Asset").unwrap().version, 3);
}

// ============================================================================
// Files
// ============================================================================

#[tokio::test]
async fn test_archive_file_loads() {
    let f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("core.json");
    let archive = content_pack();
    write_archive_file(&path, &archive).await.unwrap();

    assert_eq!(read_archive_file(&path).await.unwrap(), archive);
    let report = f.loader.load_archive_file(&path).await.unwrap();
    assert_eq!(report.entities_inserted, 3);
}

#[tokio::test]
async fn test_missing_archive_file_is_a_storage_error() {
    let f = fixture();
    let dir = tempfile::tempdir().unwrap();

    let err = f.loader.load_archive_file(&dir.path().join("absent.json")).await.unwrap_err();
    assert!(matches!(err, CoreError::Storage { .. }));
    assert_eq!(audit_count(&f, audit_codes::LOAD_FAILED.message_id), 1);
}

#[tokio::test]
async fn test_rebuilt_archive_keeps_guids() {
    let dir = tempfile::tempdir().unwrap();
    let map_path = dir.path().join("guids.json");

    let build = |map: ArchiveGuidMap| {
        let mut b = ArchiveBuilder::new(properties(), map);
        let asset = b.new_typedef("Asset", TypeDefCategory::Entity);
        b.add_typedef(asset).unwrap();
        let db = b.new_entity("db", "Asset");
        b.add_entity(db).unwrap();
        b.build()
    };

    let (first, map) = build(ArchiveGuidMap::load(&map_path).await.unwrap());
    map.save().await.unwrap();
    let (second, _) = build(ArchiveGuidMap::load(&map_path).await.unwrap());
    assert_eq!(first, second);
}
