//! Load archives into the local repository.
//!
//! Order is fixed: TypeDefs through the TypeDef manager, then patches, then
//! instances as already-homed, version-stamped inserts. Loading the same
//! archive again changes nothing.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::ConflictKind;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Relationship;
use cohort_core::RepositoryConnector;
use cohort_core::SaveOutcome;
use cohort_core::TypeDefPatch;
use cohort_typedefs::TypeDefManager;
use cohort_typedefs::TypeDefOutcome;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::archive::MetadataArchive;
use crate::archive::read_archive_file;
use crate::audit_codes;

/// What one load did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub typedefs_adopted: usize,
    pub typedefs_unchanged: usize,
    pub typedefs_conflicted: usize,
    pub patches_applied: usize,
    /// Already applied, or not applicable to the held version.
    pub patches_skipped: usize,
    pub entities_inserted: usize,
    /// Held at an equal or higher version, or of an excluded type.
    pub entities_skipped: usize,
    pub relationships_inserted: usize,
    pub relationships_skipped: usize,
}

impl LoadReport {
    /// Whether the load added or changed anything.
    pub fn changed_anything(&self) -> bool {
        self.typedefs_adopted + self.patches_applied + self.entities_inserted + self.relationships_inserted > 0
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "typedefs {} adopted, {} unchanged, {} conflicted; patches {} applied, {} skipped; \
             entities {} inserted, {} skipped; relationships {} inserted, {} skipped",
            self.typedefs_adopted,
            self.typedefs_unchanged,
            self.typedefs_conflicted,
            self.patches_applied,
            self.patches_skipped,
            self.entities_inserted,
            self.entities_skipped,
            self.relationships_inserted,
            self.relationships_skipped,
        )
    }
}

pub struct ArchiveLoader {
    local: Arc<dyn RepositoryConnector>,
    typedefs: Arc<TypeDefManager>,
    audit: AuditLog,
}

impl ArchiveLoader {
    pub fn new(local: Arc<dyn RepositoryConnector>, typedefs: Arc<TypeDefManager>, audit: &AuditLog) -> Self {
        Self {
            local,
            typedefs,
            audit: audit.for_component(AuditComponent::ArchiveLoader),
        }
    }

    /// Read and load the archive at `path`.
    pub async fn load_archive_file(&self, path: &Path) -> Result<LoadReport, CoreError> {
        let archive = match read_archive_file(path).await {
            Ok(archive) => archive,
            Err(e) => {
                let source = path.display().to_string();
                self.audit.log_error(&audit_codes::LOAD_FAILED, &[&source, &"reading the file"], &e).await;
                return Err(e.into());
            }
        };
        self.load(&archive, &path.display().to_string()).await
    }

    /// Load `archive` into the local repository.
    ///
    /// TypeDef conflicts and inapplicable patches are audit-logged and
    /// counted; they do not stop the load.
    ///
    /// # Errors
    /// [`CoreError`] if the local repository fails. Content written before
    /// the failure stays.
    pub async fn load_archive(&self, archive: &MetadataArchive) -> Result<LoadReport, CoreError> {
        self.load(archive, "memory").await
    }

    async fn load(&self, archive: &MetadataArchive, source: &str) -> Result<LoadReport, CoreError> {
        let name = &archive.properties.name;
        info!(archive = %name, guid = %archive.properties.guid, source, "loading archive");
        self.audit.log(&audit_codes::LOAD_STARTED, &[name, &archive.properties.guid, &source]).await;

        let mut report = LoadReport::default();
        self.load_typedefs(archive, &mut report).await;
        self.load_patches(archive, &mut report).await;
        if let Err(e) = self.load_instances(archive, &mut report).await {
            self.audit.log_error(&audit_codes::LOAD_FAILED, &[name, &"storing instances"], &e).await;
            return Err(e);
        }

        info!(archive = %name, report = %report, "archive loaded");
        self.audit.log(&audit_codes::LOAD_COMPLETED, &[name, &report]).await;
        Ok(report)
    }

    async fn load_typedefs(&self, archive: &MetadataArchive, report: &mut LoadReport) {
        for def in &archive.type_store.typedefs {
            match self.typedefs.add_local_typedef(def.clone()).await {
                Ok(TypeDefOutcome::Unchanged) => report.typedefs_unchanged += 1,
                Ok(_) => report.typedefs_adopted += 1,
                Err(e) => {
                    report.typedefs_conflicted += 1;
                    warn!(typedef = %def.name, error = %e, "archive typedef not accepted");
                    self.audit
                        .log(&audit_codes::TYPEDEF_REJECTED, &[&def.name, &archive.properties.name, &e])
                        .await;
                }
            }
        }
    }

    async fn load_patches(&self, archive: &MetadataArchive, report: &mut LoadReport) {
        for patch in &archive.type_store.patches {
            if self.typedefs.is_excluded(&patch.type_name) {
                report.patches_skipped += 1;
                let reason = CoreError::conflict(ConflictKind::TypeDef, "the type has an open TypeDef conflict");
                self.patch_failed(archive, patch, &reason).await;
                continue;
            }
            let held = self.typedefs.get_typedef(&patch.type_name).map(|def| def.version);
            match held {
                Some(version) if patch.applies_to_version < version => {
                    debug!(typedef = %patch.type_name, applies_to = patch.applies_to_version, "patch already applied");
                    report.patches_skipped += 1;
                }
                _ => match self.typedefs.apply_patch(patch).await {
                    Ok(_) => report.patches_applied += 1,
                    Err(e) => {
                        report.patches_skipped += 1;
                        self.patch_failed(archive, patch, &e).await;
                    }
                },
            }
        }
    }

    async fn patch_failed(&self, archive: &MetadataArchive, patch: &TypeDefPatch, err: &CoreError) {
        warn!(typedef = %patch.type_name, applies_to = patch.applies_to_version, error = %err, "archive patch not applied");
        self.audit
            .log(&audit_codes::PATCH_NOT_APPLIED, &[
                &patch.type_name,
                &patch.applies_to_version,
                &archive.properties.name,
                err,
            ])
            .await;
    }

    async fn load_instances(&self, archive: &MetadataArchive, report: &mut LoadReport) -> Result<(), CoreError> {
        for entity in &archive.instance_store.entities {
            if self.insert_entity(entity.clone()).await? {
                report.entities_inserted += 1;
            } else {
                report.entities_skipped += 1;
            }
        }
        for relationship in &archive.instance_store.relationships {
            if self.insert_relationship(relationship.clone()).await? {
                report.relationships_inserted += 1;
            } else {
                report.relationships_skipped += 1;
            }
        }
        Ok(())
    }

    async fn insert_entity(&self, entity: Entity) -> Result<bool, CoreError> {
        if self.typedefs.is_excluded(&entity.header.type_name) {
            return Ok(false);
        }
        Ok(matches!(self.local.save_entity(entity).await?, SaveOutcome::Applied))
    }

    async fn insert_relationship(&self, relationship: Relationship) -> Result<bool, CoreError> {
        if self.typedefs.is_excluded(&relationship.header.type_name) {
            return Ok(false);
        }
        Ok(matches!(self.local.save_relationship(relationship).await?, SaveOutcome::Applied))
    }
}
