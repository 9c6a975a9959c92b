//! The uniform connector contract every member exposes.
//!
//! The federation engine calls remote members exclusively through
//! [`RepositoryConnector`]; the replication processor and archive loader use
//! the same trait against the local store.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::ids::Guid;
use crate::ids::MetadataCollectionId;
use crate::instance::Entity;
use crate::instance::Relationship;
use crate::instance::SearchCriteria;
use crate::typedef::TypeDef;

/// Outcome of a version-conditional save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The incoming version was newer and is now stored.
    Applied,
    /// The store already held an equal or newer version; nothing changed.
    Stale { stored_version: u64 },
}

impl SaveOutcome {
    pub fn is_applied(self) -> bool {
        self == SaveOutcome::Applied
    }
}

/// Access to one repository's metadata.
///
/// Saves are conditional: an instance is written only when its version is
/// strictly greater than the stored one. Implementations must make the
/// compare and the write atomic per GUID.
#[async_trait]
pub trait RepositoryConnector: Send + Sync {
    /// Metadata collection id of the repository behind this connector.
    fn metadata_collection_id(&self) -> &MetadataCollectionId;

    /// Open any underlying resources.
    async fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Release any underlying resources.
    async fn disconnect(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Fetch one entity.
    ///
    /// # Returns
    /// `Ok(None)` if the repository holds no copy of the entity.
    async fn get_entity(&self, guid: &Guid) -> Result<Option<Entity>, CoreError>;

    /// Find entities matching `criteria`, at most `limit` of them.
    async fn find_entities(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<Entity>, CoreError>;

    async fn get_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CoreError>;

    /// All relationships with `entity` at either end.
    async fn get_relationships_for_entity(&self, entity: &Guid) -> Result<Vec<Relationship>, CoreError>;

    /// Find relationships matching `criteria`, at most `limit` of them.
    async fn find_relationships(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
    ) -> Result<Vec<Relationship>, CoreError>;

    /// Store `entity` if its version is newer than the stored copy.
    async fn save_entity(&self, entity: Entity) -> Result<SaveOutcome, CoreError>;

    /// Store `relationship` if its version is newer than the stored copy.
    async fn save_relationship(&self, relationship: Relationship) -> Result<SaveOutcome, CoreError>;

    /// Remove an entity copy.
    ///
    /// # Returns
    /// Whether a copy was present.
    async fn remove_entity(&self, guid: &Guid) -> Result<bool, CoreError>;

    /// Remove a relationship copy.
    async fn remove_relationship(&self, guid: &Guid) -> Result<bool, CoreError>;

    /// TypeDefs the repository can store.
    async fn notify_supported_typedefs(&self) -> Result<Vec<TypeDef>, CoreError>;
}
