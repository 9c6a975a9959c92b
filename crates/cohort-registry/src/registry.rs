//! The cohort registry state machine.
//!
//! Per remote member:
//!
//! ```text
//! Unknown ──registration──► Announced ──refresh──► Active ◄──refresh──┐
//!                               │                    │                │
//!                               └──── missed ───────►└──► Stale ──────┘
//!                                                          │
//!                     leave / N missed / admin retire ─────►  Retired
//! ```
//!
//! Transitions for one member are serialized by that member's mutex; the
//! member map lock is only held to look up or insert an entry.

use std::collections::HashMap;
use std::sync::Arc;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::CohortMembership;
use cohort_core::ConflictKind;
use cohort_core::ConnectionDescriptor;
use cohort_core::CoreError;
use cohort_core::MemberRegistration;
use cohort_core::MemberState;
use cohort_core::MetadataCollectionId;
use cohort_core::RemoteMember;
use cohort_core::TimeProvider;
use cohort_core::constants::MAX_TRACKED_MEMBERS;
use cohort_events::EventOriginator;
use cohort_events::EventPublisher;
use cohort_events::RegistrationErrorCode;
use cohort_events::RegistryEvent;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit_codes;
use crate::config::RegistryConfig;
use crate::store::RegistryStore;

/// Identity the local repository registers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMember {
    pub metadata_collection_id: MetadataCollectionId,
    pub server_name: String,
    pub connection: ConnectionDescriptor,
}

type MemberEntry = Arc<Mutex<RemoteMember>>;

#[derive(Default)]
struct MemberTable {
    /// Discovery order.
    order: Vec<MetadataCollectionId>,
    entries: HashMap<MetadataCollectionId, MemberEntry>,
}

impl MemberTable {
    fn ordered(&self) -> Vec<MemberEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id).cloned()).collect()
    }
}

/// Effect of a registration or refresh on one member entry.
enum Transition {
    Admitted,
    Readmitted,
    Refreshed { from: MemberState },
    IgnoredRetired,
    Conflict { known: ConnectionDescriptor },
    LimitReached,
}

pub struct CohortRegistry {
    local: LocalMember,
    config: RegistryConfig,
    local_registration: Mutex<Option<MemberRegistration>>,
    members: RwLock<MemberTable>,
    store: Arc<dyn RegistryStore>,
    persist_lock: tokio::sync::Mutex<()>,
    publisher: EventPublisher,
    audit: AuditLog,
    time: Arc<dyn TimeProvider>,
}

impl CohortRegistry {
    /// Open the registry, restoring membership from `store`.
    ///
    /// Members that were not retired get a fresh refresh window so a restart
    /// does not retire healthy peers before they can refresh.
    ///
    /// # Errors
    /// [`CoreError::Conflict`] if the store belongs to a different
    /// metadata collection, [`CoreError::Storage`] if it cannot be read.
    pub async fn open(
        local: LocalMember,
        config: RegistryConfig,
        store: Arc<dyn RegistryStore>,
        publisher: EventPublisher,
        audit: &AuditLog,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let membership = store.load().await?;

        if let Some(saved) = &membership.local_registration {
            if saved.metadata_collection_id != local.metadata_collection_id {
                return Err(CoreError::conflict(
                    ConflictKind::Registration,
                    format!(
                        "registry store belongs to {} but the local repository is {}",
                        saved.metadata_collection_id, local.metadata_collection_id
                    ),
                ));
            }
        }

        let now = time.now_unix_ms();
        let mut table = MemberTable::default();
        for mut member in membership.remote_members.into_iter().take(MAX_TRACKED_MEMBERS) {
            if !member.state.is_retired() {
                member.registration.latest_refresh_timestamp_ms = now;
                member.missed_refreshes = 0;
            }
            let id = member.id().clone();
            if table.entries.contains_key(&id) {
                continue;
            }
            table.order.push(id.clone());
            table.entries.insert(id, Arc::new(Mutex::new(member)));
        }
        info!(
            local = %local.metadata_collection_id,
            members = table.order.len(),
            "cohort registry opened"
        );

        Ok(Self {
            local,
            config,
            local_registration: Mutex::new(membership.local_registration),
            members: RwLock::new(table),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
            publisher,
            audit: audit.for_component(AuditComponent::CohortRegistry),
            time,
        })
    }

    pub fn local_id(&self) -> &MetadataCollectionId {
        &self.local.metadata_collection_id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn local_registration(&self) -> Option<MemberRegistration> {
        self.local_registration.lock().clone()
    }

    // ========================================================================
    // Local registration
    // ========================================================================

    /// Register the local repository with the cohort.
    ///
    /// A fresh registration publishes `Registration`. A registration restored
    /// from the store publishes `ReRegistration` followed by a
    /// `RefreshRequest` so peers that joined meanwhile answer.
    pub async fn register_local(&self) -> Result<MemberRegistration, CoreError> {
        let now = self.time.now_unix_ms();
        let candidate =
            MemberRegistration::new(self.local_id().clone(), self.local.server_name.clone(), self.local.connection.clone(), now);
        candidate.validate().map_err(|reason| CoreError::invalid("local.registration", reason))?;

        let (registration, restored) = {
            let mut slot = self.local_registration.lock();
            match slot.as_mut() {
                Some(saved) => {
                    saved.server_name = candidate.server_name;
                    saved.connection = candidate.connection;
                    saved.latest_refresh_timestamp_ms = now;
                    (saved.clone(), true)
                }
                None => {
                    *slot = Some(candidate.clone());
                    (candidate, false)
                }
            }
        };
        self.persist().await;

        if restored {
            self.audit.log(&audit_codes::LOCAL_REREGISTERED, &[self.local_id(), &self.local.server_name]).await;
            self.publisher
                .publish(RegistryEvent::ReRegistration {
                    registration: registration.clone(),
                })
                .await?;
            self.publisher.publish(RegistryEvent::RefreshRequest).await?;
        } else {
            self.audit.log(&audit_codes::LOCAL_REGISTERED, &[self.local_id(), &self.local.server_name]).await;
            self.publisher
                .publish(RegistryEvent::Registration {
                    registration: registration.clone(),
                })
                .await?;
        }
        Ok(registration)
    }

    /// Publish the local `ReRegistration`. No-op when not registered.
    pub async fn refresh_local(&self) -> Result<(), CoreError> {
        let registration = {
            let mut slot = self.local_registration.lock();
            match slot.as_mut() {
                Some(reg) => {
                    reg.latest_refresh_timestamp_ms = self.time.now_unix_ms();
                    reg.clone()
                }
                None => return Ok(()),
            }
        };
        self.publisher.publish(RegistryEvent::ReRegistration { registration }).await
    }

    /// Leave the cohort and clear the saved local registration.
    pub async fn unregister_local(&self) -> Result<(), CoreError> {
        let was_registered = self.local_registration.lock().take().is_some();
        if !was_registered {
            return Ok(());
        }
        self.persist().await;
        self.audit.log(&audit_codes::LOCAL_UNREGISTERED, &[self.local_id()]).await;
        self.publisher
            .publish(RegistryEvent::Unregistration {
                metadata_collection_id: self.local_id().clone(),
            })
            .await
    }

    // ========================================================================
    // Remote events
    // ========================================================================

    /// Apply a registry event received from `originator`.
    ///
    /// # Errors
    /// [`CoreError::Conflict`] when a registration clashes with a known
    /// member or with the local id; [`CoreError::InvalidParameter`] for an
    /// unusable registration. Both are audit-logged and answered with a
    /// `RegistrationError` before returning.
    pub async fn process_remote_registry_event(
        &self,
        originator: &EventOriginator,
        event: &RegistryEvent,
    ) -> Result<(), CoreError> {
        match event {
            RegistryEvent::Registration { registration } => {
                self.process_registration(originator, registration, true).await
            }
            RegistryEvent::ReRegistration { registration } => {
                self.process_registration(originator, registration, false).await
            }
            RegistryEvent::Unregistration { metadata_collection_id } => {
                self.process_unregistration(originator, metadata_collection_id).await;
                Ok(())
            }
            RegistryEvent::RefreshRequest => {
                debug!(from = %originator.metadata_collection_id, "refresh requested");
                self.refresh_local().await
            }
            RegistryEvent::RegistrationError { code, target, message } => {
                if target == self.local_id() {
                    let code = format!("{code:?}");
                    self.audit
                        .log(&audit_codes::REMOTE_REJECTED_LOCAL, &[&originator.metadata_collection_id, &code, message])
                        .await;
                }
                Ok(())
            }
        }
    }

    async fn process_registration(
        &self,
        originator: &EventOriginator,
        registration: &MemberRegistration,
        initial: bool,
    ) -> Result<(), CoreError> {
        let id = &registration.metadata_collection_id;

        if id == self.local_id() {
            self.audit.log(&audit_codes::LOCAL_ID_CLAIMED, &[id, &registration.server_name]).await;
            self.reply_error(RegistrationErrorCode::ConflictingCollectionId, id, "metadata collection id is in use")
                .await;
            return Err(CoreError::conflict(
                ConflictKind::Registration,
                format!("{} claims the local metadata collection id {}", registration.server_name, id),
            ));
        }

        let validation = if id != &originator.metadata_collection_id {
            Err(format!("registration for {} sent by {}", id, originator.metadata_collection_id))
        } else {
            registration.validate()
        };
        if let Err(reason) = validation {
            self.audit.log(&audit_codes::BAD_REMOTE_CONNECTION, &[id, &reason]).await;
            self.reply_error(RegistrationErrorCode::BadRemoteConnection, id, &reason).await;
            return Err(CoreError::invalid("registration", reason));
        }

        let now = self.time.now_unix_ms();
        let transition = self.apply_registration(registration, initial, now);

        match transition {
            Transition::Admitted => {
                info!(member = %id, server = %registration.server_name, "member announced");
                self.audit
                    .log(&audit_codes::MEMBER_ANNOUNCED, &[id, &registration.server_name, &registration.connection])
                    .await;
                self.persist().await;
                if initial {
                    self.refresh_local().await?;
                }
            }
            Transition::Readmitted => {
                info!(member = %id, "retired member readmitted");
                self.audit.log(&audit_codes::MEMBER_READMITTED, &[id]).await;
                self.persist().await;
                self.refresh_local().await?;
            }
            Transition::Refreshed { from } => {
                if from != MemberState::Active {
                    debug!(member = %id, from = %from, "member active");
                    if from == MemberState::Stale {
                        self.audit.log(&audit_codes::MEMBER_RECOVERED, &[id]).await;
                    }
                    self.persist().await;
                }
                if initial {
                    self.refresh_local().await?;
                }
            }
            Transition::IgnoredRetired => {
                debug!(member = %id, "refresh from retired member ignored");
            }
            Transition::Conflict { known } => {
                warn!(member = %id, known = %known, incoming = %registration.connection, "conflicting registration");
                self.audit
                    .log(&audit_codes::CONFLICTING_COLLECTION_ID, &[id, &known, &registration.connection])
                    .await;
                self.reply_error(
                    RegistrationErrorCode::ConflictingCollectionId,
                    id,
                    &format!("{} is already registered at {}", id, known),
                )
                .await;
                return Err(CoreError::conflict(
                    ConflictKind::Registration,
                    format!("{} is already registered at {}, not {}", id, known, registration.connection),
                ));
            }
            Transition::LimitReached => {
                self.audit.log(&audit_codes::MEMBER_LIMIT_REACHED, &[id, &MAX_TRACKED_MEMBERS]).await;
            }
        }
        Ok(())
    }

    /// Find or insert the entry for `registration` and apply it.
    fn apply_registration(&self, registration: &MemberRegistration, initial: bool, now: u64) -> Transition {
        let id = &registration.metadata_collection_id;
        let existing = self.members.read().entries.get(id).cloned();
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut table = self.members.write();
                match table.entries.get(id).cloned() {
                    Some(entry) => entry,
                    None => {
                        if table.order.len() >= MAX_TRACKED_MEMBERS {
                            return Transition::LimitReached;
                        }
                        let mut admitted = registration.clone();
                        admitted.latest_refresh_timestamp_ms = now;
                        table.order.push(id.clone());
                        table.entries.insert(id.clone(), Arc::new(Mutex::new(RemoteMember::announced(admitted))));
                        return Transition::Admitted;
                    }
                }
            }
        };

        let mut member = entry.lock();
        if member.registration.connection.materially_differs(&registration.connection) {
            return Transition::Conflict {
                known: member.registration.connection.clone(),
            };
        }

        if member.state.is_retired() {
            if !initial {
                return Transition::IgnoredRetired;
            }
            let mut readmitted = registration.clone();
            readmitted.latest_refresh_timestamp_ms = now;
            *member = RemoteMember::announced(readmitted);
            return Transition::Readmitted;
        }

        let from = member.state;
        member.registration.server_name = registration.server_name.clone();
        member.registration.connection.properties = registration.connection.properties.clone();
        member.registration.latest_refresh_timestamp_ms = now;
        if initial {
            member.registration.registration_timestamp_ms = registration.registration_timestamp_ms;
        }
        member.missed_refreshes = 0;
        member.consecutive_unreachable = 0;
        member.state = MemberState::Active;
        Transition::Refreshed { from }
    }

    async fn process_unregistration(&self, originator: &EventOriginator, id: &MetadataCollectionId) {
        if id != &originator.metadata_collection_id {
            warn!(member = %id, from = %originator.metadata_collection_id, "ignoring unregistration sent on behalf of another member");
            return;
        }
        let Some(entry) = self.entry(id) else {
            debug!(member = %id, "unregistration from unknown member");
            return;
        };
        let retired = {
            let mut member = entry.lock();
            if member.state.is_retired() {
                false
            } else {
                member.state = MemberState::Retired;
                member.retired_at_ms = Some(self.time.now_unix_ms());
                true
            }
        };
        if retired {
            info!(member = %id, "member left the cohort");
            self.audit.log(&audit_codes::MEMBER_LEFT, &[id]).await;
            self.persist().await;
        }
    }

    async fn reply_error(&self, code: RegistrationErrorCode, target: &MetadataCollectionId, message: &str) {
        let event = RegistryEvent::RegistrationError {
            code,
            target: target.clone(),
            message: message.to_string(),
        };
        if let Err(e) = self.publisher.publish(event).await {
            warn!(target = %target, error = %e, "failed to send registration error");
        }
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    /// Re-evaluate missed refreshes for every member.
    ///
    /// A refresh counts as missed once half a refresh interval has passed
    /// beyond its due time. One miss makes a member stale; the configured
    /// number of misses retires it.
    ///
    /// # Returns
    /// Members whose state changed, with their new state.
    pub async fn sweep(&self) -> Vec<(MetadataCollectionId, MemberState)> {
        let now = self.time.now_unix_ms();
        let interval_ms = self.config.refresh_interval_ms();
        let grace_ms = interval_ms / 2;
        let entries = self.members.read().ordered();

        let mut changes = Vec::new();
        for entry in entries {
            let mut member = entry.lock();
            if !matches!(member.state, MemberState::Announced | MemberState::Active | MemberState::Stale) {
                continue;
            }
            let elapsed = now.saturating_sub(member.registration.latest_refresh_timestamp_ms);
            let missed = (elapsed.saturating_sub(grace_ms) / interval_ms).min(u64::from(u32::MAX)) as u32;
            member.missed_refreshes = missed;

            let next = if missed >= self.config.missed_refreshes_before_retire {
                MemberState::Retired
            } else if missed >= 1 {
                MemberState::Stale
            } else {
                member.state
            };
            if next != member.state {
                member.state = next;
                if next.is_retired() {
                    member.retired_at_ms = Some(now);
                }
                changes.push((member.id().clone(), next, missed));
            }
        }

        for (id, state, missed) in &changes {
            match state {
                MemberState::Retired => {
                    info!(member = %id, missed, "member retired after missed refreshes");
                    self.audit.log(&audit_codes::MEMBER_RETIRED_MISSED_REFRESHES, &[id, missed]).await;
                }
                _ => {
                    debug!(member = %id, missed, "member stale");
                    self.audit.log(&audit_codes::MEMBER_STALE, &[id, missed]).await;
                }
            }
        }
        if !changes.is_empty() {
            self.persist().await;
        }
        changes.into_iter().map(|(id, state, _)| (id, state)).collect()
    }

    /// Record a failed call to a member, downgrading it from active to stale.
    ///
    /// Consecutive failures reaching the alert threshold are reported as an
    /// error.
    pub async fn note_unreachable(&self, id: &MetadataCollectionId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let (failures, downgraded) = {
            let mut member = entry.lock();
            if member.state.is_retired() {
                return;
            }
            member.consecutive_unreachable = member.consecutive_unreachable.saturating_add(1);
            let downgraded = member.state == MemberState::Active;
            if downgraded {
                member.state = MemberState::Stale;
            }
            (member.consecutive_unreachable, downgraded)
        };

        if failures >= self.config.unreachable_alert_threshold {
            self.audit.log(&audit_codes::MEMBER_REPEATEDLY_UNREACHABLE, &[id, &failures]).await;
        } else {
            self.audit.log(&audit_codes::MEMBER_UNREACHABLE, &[id, &failures]).await;
        }
        if downgraded {
            self.persist().await;
        }
    }

    /// Retire a member by administrative action.
    pub async fn retire(&self, id: &MetadataCollectionId) -> Result<(), CoreError> {
        let Some(entry) = self.entry(id) else {
            self.audit.log(&audit_codes::RETIRE_UNKNOWN_MEMBER, &[id]).await;
            return Err(CoreError::not_found("member", id));
        };
        let retired = {
            let mut member = entry.lock();
            if member.state.is_retired() {
                false
            } else {
                member.state = MemberState::Retired;
                member.retired_at_ms = Some(self.time.now_unix_ms());
                true
            }
        };
        if retired {
            self.audit.log(&audit_codes::MEMBER_RETIRED_BY_ADMIN, &[id]).await;
            self.persist().await;
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Registrations of members currently active.
    pub fn get_active_members(&self) -> Vec<MemberRegistration> {
        self.collect(|m| (m.state == MemberState::Active).then(|| m.registration.clone()))
    }

    /// Members federated queries are sent to: active ones first, then stale.
    pub fn get_fanout_members(&self) -> Vec<RemoteMember> {
        let mut active = self.collect(|m| (m.state == MemberState::Active).then(|| m.clone()));
        let stale = self.collect(|m| (m.state == MemberState::Stale).then(|| m.clone()));
        active.extend(stale);
        active
    }

    pub fn get_member(&self, id: &MetadataCollectionId) -> Option<RemoteMember> {
        self.entry(id).map(|entry| entry.lock().clone())
    }

    /// Every tracked member, retired ones included, in discovery order.
    pub fn list_members(&self) -> Vec<RemoteMember> {
        self.collect(|m| Some(m.clone()))
    }

    /// Retired members whose retention has expired and whose reference
    /// copies have not yet been purged.
    pub fn retired_past_retention(&self) -> Vec<MetadataCollectionId> {
        let now = self.time.now_unix_ms();
        let retention_ms = self.config.retention_after_retire.as_millis() as u64;
        self.collect(|m| {
            let expired = m.retired_at_ms.is_some_and(|at| now.saturating_sub(at) >= retention_ms);
            (m.state.is_retired() && expired && !m.reference_copies_purged).then(|| m.id().clone())
        })
    }

    pub async fn mark_reference_copies_purged(&self, id: &MetadataCollectionId) {
        if let Some(entry) = self.entry(id) {
            entry.lock().reference_copies_purged = true;
            self.persist().await;
        }
    }

    /// Current durable state.
    pub fn snapshot(&self) -> CohortMembership {
        CohortMembership {
            local_registration: self.local_registration(),
            remote_members: self.list_members(),
        }
    }

    fn entry(&self, id: &MetadataCollectionId) -> Option<MemberEntry> {
        self.members.read().entries.get(id).cloned()
    }

    fn collect<T>(&self, f: impl Fn(&RemoteMember) -> Option<T>) -> Vec<T> {
        let entries = self.members.read().ordered();
        entries.iter().filter_map(|entry| f(&*entry.lock())).collect()
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            self.audit.log_error(&audit_codes::REGISTRY_STORE_FAILED, &[], &e).await;
        }
    }
}
