//! The TypeDef manager.
//!
//! Holds the local view of the cohort type system. Announcements are
//! reconciled against the held definition:
//!
//! ```text
//! unknown name                  -> adopt
//! identical (version ignored)   -> keep the higher version
//! additive extension, newer     -> replace
//! anything else                 -> reject, record conflict, exclude type
//! ```
//!
//! Patches and replacements for one name are serialized by that name's
//! mutex; distinct names never block each other.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::ConflictKind;
use cohort_core::CoreError;
use cohort_core::Guid;
use cohort_core::MetadataCollectionId;
use cohort_core::RepositoryConnector;
use cohort_core::TypeDef;
use cohort_core::TypeDefCompatibility;
use cohort_core::TypeDefPatch;
use cohort_events::EventOriginator;
use cohort_events::EventPublisher;
use cohort_events::TypeDefEvent;
use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit_codes;

/// Effect of an announcement on the held definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDefOutcome {
    /// The name was unknown; the definition is now held.
    Adopted,
    /// A compatible definition with a higher version replaced the held one.
    Upgraded { from_version: u64 },
    /// Nothing changed.
    Unchanged,
}

impl TypeDefOutcome {
    pub fn changed(self) -> bool {
        self != TypeDefOutcome::Unchanged
    }
}

/// An announced definition that was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefConflictRecord {
    pub type_name: String,
    pub local_guid: Guid,
    pub local_version: u64,
    pub remote_guid: Guid,
    pub remote_version: u64,
    /// Member that announced the rejected definition.
    pub originator: MetadataCollectionId,
    pub reason: String,
    pub detected_at_ms: u64,
}

struct TypeDefSlot {
    def: RwLock<TypeDef>,
    guard: tokio::sync::Mutex<()>,
}

impl TypeDefSlot {
    fn new(def: TypeDef) -> Self {
        Self {
            def: RwLock::new(def),
            guard: tokio::sync::Mutex::new(()),
        }
    }
}

enum Reconciled {
    Changed(TypeDefOutcome),
    Unchanged,
    Conflict { held: TypeDef, reason: String },
}

pub struct TypeDefManager {
    slots: RwLock<BTreeMap<String, Arc<TypeDefSlot>>>,
    /// Open conflicts by type name.
    conflicts: RwLock<BTreeMap<String, Vec<TypeDefConflictRecord>>>,
    publisher: EventPublisher,
    audit: AuditLog,
}

impl TypeDefManager {
    pub fn new(publisher: EventPublisher, audit: &AuditLog) -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
            conflicts: RwLock::new(BTreeMap::new()),
            publisher,
            audit: audit.for_component(AuditComponent::TypeDefManager),
        }
    }

    fn local_id(&self) -> &MetadataCollectionId {
        self.publisher.local_id()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_typedef(&self, name: &str) -> Option<TypeDef> {
        self.slot(name).map(|slot| slot.def.read().clone())
    }

    /// Every held definition, ordered by name.
    pub fn list_typedefs(&self) -> Vec<TypeDef> {
        let slots: Vec<Arc<TypeDefSlot>> = self.slots.read().values().cloned().collect();
        slots.iter().map(|slot| slot.def.read().clone()).collect()
    }

    /// Open conflicts, ordered by type name then detection.
    pub fn list_conflicts(&self) -> Vec<TypeDefConflictRecord> {
        self.conflicts.read().values().flatten().cloned().collect()
    }

    /// Whether instances of `type_name` are excluded because of an open
    /// conflict.
    pub fn is_excluded(&self, type_name: &str) -> bool {
        self.conflicts.read().contains_key(type_name)
    }

    fn slot(&self, name: &str) -> Option<Arc<TypeDefSlot>> {
        self.slots.read().get(name).cloned()
    }

    // ========================================================================
    // Announcements
    // ========================================================================

    /// Add a locally authored or archive-loaded definition.
    ///
    /// Follows the same rules as a remote announcement; an adopted or
    /// upgraded definition is announced to the cohort.
    pub async fn add_local_typedef(&self, def: TypeDef) -> Result<TypeDefOutcome, CoreError> {
        def.validate()?;
        let local = self.local_id().clone();
        match self.reconcile(def.clone()).await {
            Reconciled::Changed(outcome) => {
                self.audit_change(&def, outcome, &local).await;
                self.broadcast(TypeDefEvent::NewTypeDef { typedef: def }).await;
                Ok(outcome)
            }
            Reconciled::Unchanged => Ok(TypeDefOutcome::Unchanged),
            Reconciled::Conflict { held, reason } => Err(self.record_conflict(&held, &def, &local, reason).await),
        }
    }

    /// Reconcile a definition announced by another member.
    ///
    /// # Errors
    /// [`CoreError::Conflict`] when the definition is incompatible with the
    /// held one. The conflict is audit-logged and reported back to the
    /// announcing member once per (name, member).
    pub async fn process_remote_typedef(
        &self,
        originator: &EventOriginator,
        def: &TypeDef,
    ) -> Result<TypeDefOutcome, CoreError> {
        let from = &originator.metadata_collection_id;
        if let Err(e) = def.validate() {
            self.audit.log(&audit_codes::INVALID_REMOTE_TYPEDEF, &[from, &def.name, &e]).await;
            return Err(e);
        }
        match self.reconcile(def.clone()).await {
            Reconciled::Changed(outcome) => {
                self.audit_change(def, outcome, from).await;
                Ok(outcome)
            }
            Reconciled::Unchanged => {
                debug!(typedef = %def.name, from = %from, "typedef announcement changes nothing");
                Ok(TypeDefOutcome::Unchanged)
            }
            Reconciled::Conflict { held, reason } => Err(self.record_conflict(&held, def, from, reason).await),
        }
    }

    /// Apply a TypeDef event received from `originator`.
    pub async fn process_remote_event(&self, originator: &EventOriginator, event: &TypeDefEvent) -> Result<(), CoreError> {
        match event {
            TypeDefEvent::NewTypeDef { typedef } | TypeDefEvent::UpdatedTypeDef { typedef, .. } => {
                self.process_remote_typedef(originator, typedef).await.map(|_| ())
            }
            TypeDefEvent::TypeDefConflict {
                type_name,
                local_guid,
                remote_guid,
                target,
                message,
            } => {
                if target == self.local_id() {
                    warn!(typedef = %type_name, from = %originator.metadata_collection_id, "member reports a typedef conflict");
                    self.audit
                        .log(&audit_codes::REMOTE_REPORTED_CONFLICT, &[
                            &originator.metadata_collection_id,
                            type_name,
                            local_guid,
                            remote_guid,
                            message,
                        ])
                        .await;
                }
                Ok(())
            }
        }
    }

    async fn reconcile(&self, incoming: TypeDef) -> Reconciled {
        let slot = {
            let existing = self.slots.read().get(&incoming.name).cloned();
            match existing {
                Some(slot) => slot,
                None => {
                    let mut slots = self.slots.write();
                    match slots.entry(incoming.name.clone()) {
                        Entry::Occupied(entry) => entry.get().clone(),
                        Entry::Vacant(entry) => {
                            entry.insert(Arc::new(TypeDefSlot::new(incoming)));
                            return Reconciled::Changed(TypeDefOutcome::Adopted);
                        }
                    }
                }
            }
        };

        let _guard = slot.guard.lock().await;
        let held = slot.def.read().clone();
        match held.compatibility(&incoming) {
            TypeDefCompatibility::Identical if incoming.version > held.version => {
                *slot.def.write() = incoming;
                Reconciled::Changed(TypeDefOutcome::Upgraded {
                    from_version: held.version,
                })
            }
            TypeDefCompatibility::Extends => {
                *slot.def.write() = incoming;
                Reconciled::Changed(TypeDefOutcome::Upgraded {
                    from_version: held.version,
                })
            }
            TypeDefCompatibility::Identical | TypeDefCompatibility::ExtendedBy => Reconciled::Unchanged,
            TypeDefCompatibility::Incompatible(reason) => Reconciled::Conflict { held, reason },
        }
    }

    async fn audit_change(&self, def: &TypeDef, outcome: TypeDefOutcome, from: &MetadataCollectionId) {
        match outcome {
            TypeDefOutcome::Adopted => {
                info!(typedef = %def.name, version = def.version, from = %from, "typedef adopted");
                self.audit.log(&audit_codes::TYPEDEF_ADOPTED, &[&def.name, &def.version, &def.guid, from]).await;
            }
            TypeDefOutcome::Upgraded { from_version } => {
                info!(typedef = %def.name, from_version, to_version = def.version, "typedef upgraded");
                self.audit
                    .log(&audit_codes::TYPEDEF_UPGRADED, &[&def.name, &from_version, &def.version, from])
                    .await;
            }
            TypeDefOutcome::Unchanged => {}
        }
    }

    /// Record a rejected definition and build the error to return.
    ///
    /// Only the first rejection per (name, originator) is audited and, for
    /// remote originators, reported back.
    async fn record_conflict(
        &self,
        held: &TypeDef,
        incoming: &TypeDef,
        originator: &MetadataCollectionId,
        reason: String,
    ) -> CoreError {
        let record = TypeDefConflictRecord {
            type_name: held.name.clone(),
            local_guid: held.guid.clone(),
            local_version: held.version,
            remote_guid: incoming.guid.clone(),
            remote_version: incoming.version,
            originator: originator.clone(),
            reason: reason.clone(),
            detected_at_ms: self.publisher.now_ms(),
        };
        let first = {
            let mut conflicts = self.conflicts.write();
            let records = conflicts.entry(held.name.clone()).or_default();
            if records.iter().any(|r| &r.originator == originator) {
                false
            } else {
                records.push(record);
                true
            }
        };

        if first {
            warn!(typedef = %held.name, from = %originator, reason = %reason, "typedef conflict");
            self.audit.log(&audit_codes::TYPEDEF_CONFLICT, &[&held.name, originator, &reason]).await;
            if originator != self.local_id() {
                self.broadcast(TypeDefEvent::TypeDefConflict {
                    type_name: held.name.clone(),
                    local_guid: held.guid.clone(),
                    remote_guid: incoming.guid.clone(),
                    target: originator.clone(),
                    message: reason.clone(),
                })
                .await;
            }
        } else {
            debug!(typedef = %held.name, from = %originator, "repeated conflicting typedef announcement");
        }

        CoreError::conflict(
            ConflictKind::TypeDef,
            format!("{} from {} conflicts with the held definition: {}", held.name, originator, reason),
        )
    }

    // ========================================================================
    // Patches and administration
    // ========================================================================

    /// Apply `patch` to the held definition and announce the result.
    ///
    /// # Errors
    /// [`CoreError::NotFound`] for an unknown name,
    /// [`CoreError::VersionMismatch`] if the patch is bound to a version
    /// other than the held one. The held definition is unchanged on error.
    pub async fn apply_patch(&self, patch: &TypeDefPatch) -> Result<TypeDef, CoreError> {
        let Some(slot) = self.slot(&patch.type_name) else {
            warn!(typedef = %patch.type_name, "patch names an unknown typedef");
            self.audit.log(&audit_codes::PATCH_UNKNOWN_TYPEDEF, &[&patch.type_name, &patch.applies_to_version]).await;
            return Err(CoreError::not_found("typedef", &patch.type_name));
        };
        let _guard = slot.guard.lock().await;
        let current = slot.def.read().clone();

        let patched = match current.apply_patch(patch) {
            Ok(patched) => patched,
            Err(e) => {
                match &e {
                    CoreError::VersionMismatch { expected, actual, .. } => {
                        self.audit
                            .log(&audit_codes::PATCH_VERSION_MISMATCH, &[&patch.type_name, expected, actual])
                            .await;
                    }
                    other => {
                        self.audit.log(&audit_codes::PATCH_REJECTED, &[&patch.type_name, other]).await;
                    }
                }
                return Err(e);
            }
        };
        *slot.def.write() = patched.clone();

        info!(typedef = %patched.name, version = patched.version, "typedef patched");
        self.audit.log(&audit_codes::PATCH_APPLIED, &[&patched.name, &patched.version]).await;
        self.broadcast(TypeDefEvent::UpdatedTypeDef {
            patch: patch.clone(),
            typedef: patched.clone(),
        })
        .await;
        Ok(patched)
    }

    /// Clear the conflicts recorded for `type_name` and lift its exclusion.
    ///
    /// # Returns
    /// Number of conflict records cleared.
    pub async fn resolve_conflict(&self, type_name: &str) -> usize {
        let cleared = self.conflicts.write().remove(type_name).map(|records| records.len()).unwrap_or(0);
        if cleared > 0 {
            info!(typedef = %type_name, cleared, "typedef conflicts resolved");
            self.audit.log(&audit_codes::CONFLICT_RESOLVED, &[&type_name, &cleared]).await;
        }
        cleared
    }

    /// Load the definitions the local repository supports.
    ///
    /// Nothing is announced; call [`TypeDefManager::announce_all`] once the
    /// local member has registered.
    pub async fn seed_from_connector(&self, connector: &dyn RepositoryConnector) -> Result<usize, CoreError> {
        let local = self.local_id().clone();
        let mut adopted = 0usize;
        for def in connector.notify_supported_typedefs().await? {
            if let Err(e) = def.validate() {
                warn!(typedef = %def.name, error = %e, "skipping invalid typedef from local repository");
                continue;
            }
            match self.reconcile(def.clone()).await {
                Reconciled::Changed(_) => adopted += 1,
                Reconciled::Unchanged => {}
                Reconciled::Conflict { held, reason } => {
                    self.record_conflict(&held, &def, &local, reason).await;
                }
            }
        }
        self.audit.log(&audit_codes::TYPEDEFS_SEEDED, &[&adopted]).await;
        Ok(adopted)
    }

    /// Announce every held definition.
    pub async fn announce_all(&self) -> Result<usize, CoreError> {
        let defs = self.list_typedefs();
        for typedef in &defs {
            self.publisher
                .publish(TypeDefEvent::NewTypeDef {
                    typedef: typedef.clone(),
                })
                .await?;
        }
        debug!(count = defs.len(), "announced typedefs");
        Ok(defs.len())
    }

    async fn broadcast(&self, event: TypeDefEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "failed to publish typedef event");
        }
    }
}
