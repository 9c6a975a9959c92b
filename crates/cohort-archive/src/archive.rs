//! Archive content and its JSON file form.

use std::path::Path;

use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::TypeDef;
use cohort_core::TypeDefPatch;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;

use crate::error::DecodeSnafu;
use crate::error::EncodeSnafu;
use crate::error::IoSnafu;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveType {
    /// Reusable definitions and reference content.
    #[default]
    ContentPack,
    /// A copy of a repository's metadata.
    MetadataExport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProperties {
    pub guid: Guid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub archive_type: ArchiveType,
    #[serde(default)]
    pub originator_name: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub creation_date_ms: u64,
    /// GUIDs of archives that must be loaded first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Guid>,
}

impl ArchiveProperties {
    /// The metadata collection id instances in this archive are homed at.
    pub fn home(&self) -> MetadataCollectionId {
        MetadataCollectionId::new(self.guid.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTypeStore {
    #[serde(default)]
    pub typedefs: Vec<TypeDef>,
    /// Applied in order after every TypeDef.
    #[serde(default)]
    pub patches: Vec<TypeDefPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveInstanceStore {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// A self-contained bundle of TypeDefs, patches and instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataArchive {
    pub properties: ArchiveProperties,
    #[serde(default)]
    pub type_store: ArchiveTypeStore,
    #[serde(default)]
    pub instance_store: ArchiveInstanceStore,
}

pub async fn read_archive_file(path: &Path) -> Result<MetadataArchive> {
    let bytes = tokio::fs::read(path).await.context(IoSnafu { path })?;
    serde_json::from_slice(&bytes).context(DecodeSnafu { path })
}

pub async fn write_archive_file(path: &Path, archive: &MetadataArchive) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(archive).context(EncodeSnafu)?;
    tokio::fs::write(path, bytes).await.context(IoSnafu { path })
}
