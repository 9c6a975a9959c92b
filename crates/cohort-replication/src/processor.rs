//! Inbound instance event processing.
//!
//! Reference copies are only ever written through the connector's
//! version-conditional save, so concurrent events for one GUID settle on the
//! highest version without a lock and distinct GUIDs never contend.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::Instance;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::RepositoryConnector;
use cohort_core::SaveOutcome;
use cohort_core::SearchCriteria;
use cohort_core::constants::MAX_BULK_SCAN;
use cohort_core::constants::MAX_REPORTED_INSTANCE_CONFLICTS;
use cohort_core::constants::MAX_TOMBSTONES;
use cohort_events::EventOriginator;
use cohort_events::EventPublisher;
use cohort_events::InstanceEvent;
use cohort_typedefs::TypeDefManager;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit_codes;
use crate::replica::Replica;
use crate::tombstones::Tombstones;

/// What processing one instance event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationOutcome {
    /// The reference copy was written.
    Applied,
    /// The event was older than, or equal to, what is held.
    Stale,
    /// The event contradicts the instance's home and was dropped.
    Conflict,
    /// The instance's type is excluded by a TypeDef conflict.
    Excluded,
    /// The reference copy was removed.
    Removed,
    /// There was no copy to remove or refresh.
    NotHeld,
    /// The authoritative state was republished.
    RefreshServed,
    /// The event is addressed to another member.
    Ignored,
    /// A member reported that one of our events contradicted a home.
    ConflictReported,
}

/// Counters kept by the processor.
#[derive(Debug, Default)]
pub struct ReplicationStats {
    pub applied: AtomicU64,
    pub stale_dropped: AtomicU64,
    pub conflicts_dropped: AtomicU64,
    pub excluded_dropped: AtomicU64,
    pub removed: AtomicU64,
    pub refreshes_served: AtomicU64,
}

impl ReplicationStats {
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    pub fn conflicts_dropped(&self) -> u64 {
        self.conflicts_dropped.load(Ordering::Relaxed)
    }

    pub fn excluded_dropped(&self) -> u64 {
        self.excluded_dropped.load(Ordering::Relaxed)
    }

    pub fn refreshes_served(&self) -> u64 {
        self.refreshes_served.load(Ordering::Relaxed)
    }

    fn count(&self, outcome: ReplicationOutcome) {
        let counter = match outcome {
            ReplicationOutcome::Applied => &self.applied,
            ReplicationOutcome::Stale => &self.stale_dropped,
            ReplicationOutcome::Conflict => &self.conflicts_dropped,
            ReplicationOutcome::Excluded => &self.excluded_dropped,
            ReplicationOutcome::Removed => &self.removed,
            ReplicationOutcome::RefreshServed => &self.refreshes_served,
            ReplicationOutcome::NotHeld | ReplicationOutcome::Ignored | ReplicationOutcome::ConflictReported => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct InstanceReplicationProcessor {
    local: Arc<dyn RepositoryConnector>,
    typedefs: Arc<TypeDefManager>,
    publisher: EventPublisher,
    audit: AuditLog,
    tombstones: Mutex<Tombstones>,
    /// (instance, member) pairs already sent a conflict report.
    reported_conflicts: Mutex<HashSet<(Guid, MetadataCollectionId)>>,
    stats: ReplicationStats,
}

impl InstanceReplicationProcessor {
    pub fn new(
        local: Arc<dyn RepositoryConnector>,
        typedefs: Arc<TypeDefManager>,
        publisher: EventPublisher,
        audit: &AuditLog,
    ) -> Self {
        Self {
            local,
            typedefs,
            publisher,
            audit: audit.for_component(AuditComponent::InstanceReplication),
            tombstones: Mutex::new(Tombstones::new(MAX_TOMBSTONES)),
            reported_conflicts: Mutex::new(HashSet::new()),
            stats: ReplicationStats::default(),
        }
    }

    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    fn local_id(&self) -> &MetadataCollectionId {
        self.publisher.local_id()
    }

    /// Apply an instance event received from `originator`.
    ///
    /// Dropped events are reported through the outcome, not as errors.
    ///
    /// # Errors
    /// [`CoreError`] only when the local repository fails; the failure is
    /// audit-logged first.
    pub async fn process_event(
        &self,
        originator: &EventOriginator,
        event: &InstanceEvent,
    ) -> Result<ReplicationOutcome, CoreError> {
        let outcome = match event {
            InstanceEvent::NewEntity { entity }
            | InstanceEvent::UpdatedEntity { entity }
            | InstanceEvent::RefreshedEntity { entity } => self.apply_upsert(originator, entity.clone()).await?,
            InstanceEvent::DeletedEntity { entity } => self.apply_delete(originator, entity.clone()).await?,
            InstanceEvent::PurgedEntity { guid, type_name, home } => {
                self.apply_purge::<Entity>(originator, guid, type_name, home).await?
            }
            InstanceEvent::RefreshEntityRequest { guid, home, .. } => self.serve_refresh::<Entity>(guid, home).await?,
            InstanceEvent::NewRelationship { relationship }
            | InstanceEvent::UpdatedRelationship { relationship }
            | InstanceEvent::RefreshedRelationship { relationship } => {
                self.apply_upsert(originator, relationship.clone()).await?
            }
            InstanceEvent::DeletedRelationship { relationship } => {
                self.apply_delete(originator, relationship.clone()).await?
            }
            InstanceEvent::PurgedRelationship { guid, type_name, home } => {
                self.apply_purge::<Relationship>(originator, guid, type_name, home).await?
            }
            InstanceEvent::RefreshRelationshipRequest { guid, home, .. } => {
                self.serve_refresh::<Relationship>(guid, home).await?
            }
            InstanceEvent::InstanceConflict {
                guid,
                home,
                target,
                message,
            } => self.conflict_reported(originator, guid, home, target, message).await,
        };
        self.stats.count(outcome);
        debug!(guid = %event.guid(), from = %originator.metadata_collection_id, outcome = ?outcome, "instance event processed");
        Ok(outcome)
    }

    /// Drop events that break home authority or concern an excluded type.
    async fn screen(
        &self,
        originator: &EventOriginator,
        kind: &str,
        guid: &Guid,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Option<ReplicationOutcome> {
        let from = &originator.metadata_collection_id;
        if home == self.local_id() || from != home {
            warn!(guid = %guid, from = %from, home = %home, "instance event from a member other than the home");
            self.audit.log(&audit_codes::INSTANCE_CONFLICT, &[from, &kind, guid, home]).await;
            self.report_conflict(from, kind, guid, home).await;
            return Some(ReplicationOutcome::Conflict);
        }
        if self.typedefs.is_excluded(type_name) {
            debug!(guid = %guid, type_name, "instance of excluded type dropped");
            return Some(ReplicationOutcome::Excluded);
        }
        None
    }

    /// Tell `offender` its event about `guid` was dropped, once per pair.
    async fn report_conflict(&self, offender: &MetadataCollectionId, kind: &str, guid: &Guid, home: &MetadataCollectionId) {
        let first = {
            let mut reported = self.reported_conflicts.lock();
            if reported.len() >= MAX_REPORTED_INSTANCE_CONFLICTS {
                reported.clear();
            }
            reported.insert((guid.clone(), offender.clone()))
        };
        if !first {
            debug!(guid = %guid, to = %offender, "instance conflict already reported");
            return;
        }
        let event = InstanceEvent::InstanceConflict {
            guid: guid.clone(),
            home: home.clone(),
            target: offender.clone(),
            message: format!("only {} may publish changes to {} {}", home, kind, guid),
        };
        if let Err(e) = self.publisher.publish(event).await {
            warn!(guid = %guid, to = %offender, error = %e, "failed to publish instance conflict");
        }
    }

    async fn conflict_reported(
        &self,
        originator: &EventOriginator,
        guid: &Guid,
        home: &MetadataCollectionId,
        target: &MetadataCollectionId,
        message: &str,
    ) -> ReplicationOutcome {
        if target != self.local_id() {
            return ReplicationOutcome::Ignored;
        }
        let from = &originator.metadata_collection_id;
        warn!(guid = %guid, from = %from, home = %home, "member reports an instance conflict");
        self.audit
            .log(&audit_codes::REMOTE_REPORTED_INSTANCE_CONFLICT, &[from, guid, home, &message])
            .await;
        ReplicationOutcome::ConflictReported
    }

    async fn apply_upsert<T: Replica>(
        &self,
        originator: &EventOriginator,
        instance: T,
    ) -> Result<ReplicationOutcome, CoreError> {
        let header = instance.header();
        if let Some(outcome) = self.screen(originator, T::KIND, &header.guid, &header.type_name, &header.home).await {
            return Ok(outcome);
        }
        if self.tombstones.lock().blocks(instance.guid(), instance.version()) {
            return Ok(ReplicationOutcome::Stale);
        }

        let guid = instance.guid().clone();
        match T::store(self.local.as_ref(), instance).await {
            Ok(SaveOutcome::Applied) => Ok(ReplicationOutcome::Applied),
            Ok(SaveOutcome::Stale { .. }) => Ok(ReplicationOutcome::Stale),
            Err(e) => Err(self.local_failure("save", &guid, e).await),
        }
    }

    async fn apply_delete<T: Replica>(
        &self,
        originator: &EventOriginator,
        instance: T,
    ) -> Result<ReplicationOutcome, CoreError> {
        let header = instance.header();
        if let Some(outcome) = self.screen(originator, T::KIND, &header.guid, &header.type_name, &header.home).await {
            return Ok(outcome);
        }
        let guid = instance.guid().clone();
        let stored = match T::fetch(self.local.as_ref(), &guid).await {
            Ok(stored) => stored,
            Err(e) => return Err(self.local_failure("read", &guid, e).await),
        };
        if stored.as_ref().is_some_and(|s| s.version() > instance.version()) {
            return Ok(ReplicationOutcome::Stale);
        }

        self.tombstones.lock().record(&guid, instance.version());
        self.remove::<T>(&guid).await
    }

    async fn apply_purge<T: Replica>(
        &self,
        originator: &EventOriginator,
        guid: &Guid,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<ReplicationOutcome, CoreError> {
        if let Some(outcome) = self.screen(originator, T::KIND, guid, type_name, home).await {
            return Ok(outcome);
        }
        // A purge is final whatever versions arrive later.
        self.tombstones.lock().record(guid, u64::MAX);
        self.remove::<T>(guid).await
    }

    async fn remove<T: Replica>(&self, guid: &Guid) -> Result<ReplicationOutcome, CoreError> {
        match T::discard(self.local.as_ref(), guid).await {
            Ok(true) => Ok(ReplicationOutcome::Removed),
            Ok(false) => Ok(ReplicationOutcome::NotHeld),
            Err(e) => Err(self.local_failure("remove", guid, e).await),
        }
    }

    async fn serve_refresh<T: Replica>(
        &self,
        guid: &Guid,
        home: &MetadataCollectionId,
    ) -> Result<ReplicationOutcome, CoreError> {
        if home != self.local_id() {
            return Ok(ReplicationOutcome::Ignored);
        }
        let current = match T::fetch(self.local.as_ref(), guid).await {
            Ok(current) => current,
            Err(e) => return Err(self.local_failure("read", guid, e).await),
        };
        match current {
            Some(instance) => {
                self.publisher.publish(instance.refreshed()).await?;
                Ok(ReplicationOutcome::RefreshServed)
            }
            None => Ok(ReplicationOutcome::NotHeld),
        }
    }

    async fn local_failure(&self, operation: &str, subject: &(dyn fmt::Display + Sync), err: CoreError) -> CoreError {
        self.audit.log_error(&audit_codes::LOCAL_STORE_FAILED, &[&operation, subject], &err).await;
        err
    }

    /// Remove every reference copy homed at `home`.
    ///
    /// # Returns
    /// Number of entity and relationship copies removed.
    pub async fn purge_reference_copies(&self, home: &MetadataCollectionId) -> Result<(usize, usize), CoreError> {
        if home == self.local_id() {
            return Err(CoreError::invalid("home", "the local repository holds no reference copies of itself"));
        }
        match self.remove_copies_homed_at(home).await {
            Ok((entities, relationships)) => {
                info!(home = %home, entities, relationships, "reference copies purged");
                self.audit.log(&audit_codes::REFERENCE_COPIES_PURGED, &[home, &entities, &relationships]).await;
                Ok((entities, relationships))
            }
            Err(e) => Err(self.local_failure("purge reference copies homed at", home, e).await),
        }
    }

    async fn remove_copies_homed_at(&self, home: &MetadataCollectionId) -> Result<(usize, usize), CoreError> {
        let criteria = SearchCriteria::homed_at(home.clone());

        let entities = self.local.find_entities(&criteria, MAX_BULK_SCAN).await?;
        let mut removed_entities = 0usize;
        for entity in &entities {
            if self.local.remove_entity(entity.guid()).await? {
                removed_entities += 1;
            }
        }

        let relationships = self.local.find_relationships(&criteria, MAX_BULK_SCAN).await?;
        let mut removed_relationships = 0usize;
        for relationship in &relationships {
            if self.local.remove_relationship(relationship.guid()).await? {
                removed_relationships += 1;
            }
        }

        Ok((removed_entities, removed_relationships))
    }
}
