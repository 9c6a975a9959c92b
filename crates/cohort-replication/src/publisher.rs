//! Outbound changes to instances homed at the local repository.
//!
//! Every change bumps the version, is written to the local repository and
//! is then published so members holding reference copies can follow.

use std::sync::Arc;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::ConflictKind;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::Instance;
use cohort_core::InstanceHeader;
use cohort_core::InstanceStatus;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::RepositoryConnector;
use cohort_core::SaveOutcome;
use cohort_events::EventPublisher;
use cohort_events::InstanceEvent;
use tracing::debug;
use tracing::warn;

use crate::audit_codes;
use crate::replica::Replica;

pub struct InstancePublisher {
    local: Arc<dyn RepositoryConnector>,
    publisher: EventPublisher,
    audit: AuditLog,
}

impl InstancePublisher {
    pub fn new(local: Arc<dyn RepositoryConnector>, publisher: EventPublisher, audit: &AuditLog) -> Self {
        Self {
            local,
            publisher,
            audit: audit.for_component(AuditComponent::InstanceReplication),
        }
    }

    fn local_id(&self) -> &MetadataCollectionId {
        self.publisher.local_id()
    }

    pub async fn create_entity(&self, entity: Entity) -> Result<Entity, CoreError> {
        self.create(entity).await
    }

    /// Replace an entity's properties and classifications.
    ///
    /// `entity.header.version` must be the version currently held.
    pub async fn update_entity(&self, entity: Entity) -> Result<Entity, CoreError> {
        self.update(entity, |stored: &mut Entity, incoming: Entity| {
            stored.properties = incoming.properties;
            stored.classifications = incoming.classifications;
        })
        .await
    }

    /// Soft-delete an entity. The home keeps the deleted copy.
    pub async fn delete_entity(&self, guid: &Guid) -> Result<Entity, CoreError> {
        self.delete::<Entity>(guid).await
    }

    /// Remove an entity permanently.
    pub async fn purge_entity(&self, guid: &Guid) -> Result<(), CoreError> {
        self.purge::<Entity>(guid).await
    }

    pub async fn create_relationship(&self, relationship: Relationship) -> Result<Relationship, CoreError> {
        self.create(relationship).await
    }

    pub async fn update_relationship(&self, relationship: Relationship) -> Result<Relationship, CoreError> {
        self.update(relationship, |stored: &mut Relationship, incoming: Relationship| {
            stored.properties = incoming.properties;
        })
        .await
    }

    pub async fn delete_relationship(&self, guid: &Guid) -> Result<Relationship, CoreError> {
        self.delete::<Relationship>(guid).await
    }

    pub async fn purge_relationship(&self, guid: &Guid) -> Result<(), CoreError> {
        self.purge::<Relationship>(guid).await
    }

    /// Ask the home of an entity to republish it.
    pub async fn request_entity_refresh(
        &self,
        guid: Guid,
        type_name: impl Into<String>,
        home: MetadataCollectionId,
    ) -> Result<(), CoreError> {
        let event = Entity::refresh_request(guid.clone(), type_name.into(), home);
        self.send("refresh request", &guid, event).await
    }

    pub async fn request_relationship_refresh(
        &self,
        guid: Guid,
        type_name: impl Into<String>,
        home: MetadataCollectionId,
    ) -> Result<(), CoreError> {
        let event = Relationship::refresh_request(guid.clone(), type_name.into(), home);
        self.send("refresh request", &guid, event).await
    }

    // ========================================================================
    // Shared implementation
    // ========================================================================

    async fn create<T: Replica>(&self, mut instance: T) -> Result<T, CoreError> {
        self.ensure_home("create", instance.header()).await?;
        if self.fetch::<T>("create", instance.guid()).await?.is_some() {
            let err = CoreError::conflict(
                ConflictKind::Instance,
                format!("{} {} already exists", T::KIND, instance.guid()),
            );
            return Err(self.rejected("create", instance.guid(), err).await);
        }
        let now = self.publisher.now_ms();
        {
            let header = instance.header_mut();
            header.version = 1;
            header.status = InstanceStatus::Active;
            header.created_ms = now;
            header.updated_ms = now;
        }
        self.write("create", instance.clone()).await?;
        self.announce("created", &instance).await;
        self.send("create", instance.guid(), instance.clone().created()).await?;
        Ok(instance)
    }

    async fn update<T: Replica>(&self, incoming: T, merge: impl FnOnce(&mut T, T) + Send) -> Result<T, CoreError> {
        let mut stored = self.fetch_home::<T>("update", incoming.guid()).await?;
        if incoming.version() != stored.version() {
            let err = CoreError::VersionMismatch {
                subject: incoming.guid().to_string(),
                expected: incoming.version(),
                actual: stored.version(),
            };
            return Err(self.rejected("update", incoming.guid(), err).await);
        }
        merge(&mut stored, incoming);
        self.bump(&mut stored);
        self.write("update", stored.clone()).await?;
        self.announce("updated", &stored).await;
        self.send("update", stored.guid(), stored.clone().updated()).await?;
        Ok(stored)
    }

    async fn delete<T: Replica>(&self, guid: &Guid) -> Result<T, CoreError> {
        let mut stored = self.fetch_home::<T>("delete", guid).await?;
        if stored.header().status == InstanceStatus::Deleted {
            return Ok(stored);
        }
        stored.header_mut().status = InstanceStatus::Deleted;
        self.bump(&mut stored);
        self.write("delete", stored.clone()).await?;
        self.announce("deleted", &stored).await;
        self.send("delete", guid, stored.clone().deleted()).await?;
        Ok(stored)
    }

    async fn purge<T: Replica>(&self, guid: &Guid) -> Result<(), CoreError> {
        let stored = self.fetch_home::<T>("purge", guid).await?;
        if let Err(e) = T::discard(self.local.as_ref(), guid).await {
            return Err(self.store_failed("purge", guid, e).await);
        }
        self.announce("purged", &stored).await;
        let header = stored.header();
        self.send("purge", guid, T::purged(header.guid.clone(), header.type_name.clone(), header.home.clone())).await
    }

    async fn fetch<T: Replica>(&self, operation: &str, guid: &Guid) -> Result<Option<T>, CoreError> {
        match T::fetch(self.local.as_ref(), guid).await {
            Ok(found) => Ok(found),
            Err(e) => Err(self.store_failed(operation, guid, e).await),
        }
    }

    async fn fetch_home<T: Replica>(&self, operation: &str, guid: &Guid) -> Result<T, CoreError> {
        let Some(stored) = self.fetch::<T>(operation, guid).await? else {
            return Err(self.rejected(operation, guid, CoreError::not_found(T::KIND, guid)).await);
        };
        self.ensure_home(operation, stored.header()).await?;
        Ok(stored)
    }

    async fn ensure_home(&self, operation: &str, header: &InstanceHeader) -> Result<(), CoreError> {
        if !header.is_reference_copy_for(self.local_id()) {
            return Ok(());
        }
        self.audit
            .log(&audit_codes::REFERENCE_COPY_CHANGE_REFUSED, &[&operation, &header.guid, &header.home])
            .await;
        Err(CoreError::conflict(
            ConflictKind::Instance,
            format!("cannot {} {}: it is homed at {}", operation, header.guid, header.home),
        ))
    }

    async fn rejected(&self, operation: &str, guid: &Guid, err: CoreError) -> CoreError {
        debug!(%guid, operation, error = %err, "home change rejected");
        self.audit.log(&audit_codes::HOME_CHANGE_REJECTED, &[&operation, guid, &err]).await;
        err
    }

    async fn store_failed(&self, operation: &str, guid: &Guid, err: CoreError) -> CoreError {
        warn!(%guid, operation, error = %err, "local repository failed during home change");
        self.audit.log_error(&audit_codes::HOME_STORE_FAILED, &[&operation, guid], &err).await;
        err
    }

    async fn send(&self, operation: &str, guid: &Guid, event: InstanceEvent) -> Result<(), CoreError> {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(%guid, operation, error = %e, "home change stored but not published");
            self.audit.log_error(&audit_codes::HOME_CHANGE_NOT_PUBLISHED, &[&operation, guid], &e).await;
            return Err(e);
        }
        Ok(())
    }

    fn bump<T: Instance>(&self, instance: &mut T) {
        let now = self.publisher.now_ms();
        let header = instance.header_mut();
        header.version += 1;
        header.updated_ms = now.max(header.updated_ms);
    }

    async fn write<T: Replica>(&self, operation: &str, instance: T) -> Result<(), CoreError> {
        let guid = instance.guid().clone();
        match T::store(self.local.as_ref(), instance).await {
            Ok(SaveOutcome::Applied) => Ok(()),
            Ok(SaveOutcome::Stale { stored_version }) => {
                let err = CoreError::VersionMismatch {
                    subject: guid.to_string(),
                    expected: stored_version.saturating_sub(1),
                    actual: stored_version,
                };
                Err(self.rejected(operation, &guid, err).await)
            }
            Err(e) => Err(self.store_failed(operation, &guid, e).await),
        }
    }

    async fn announce<T: Replica>(&self, change: &str, instance: &T) {
        debug!(guid = %instance.guid(), version = instance.version(), change, "home instance changed");
        self.audit
            .log(&audit_codes::HOME_INSTANCE_CHANGED, &[&T::KIND, &change, instance.guid(), &instance.version()])
            .await;
    }
}
