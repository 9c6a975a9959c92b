//! Stable GUIDs for archive content.
//!
//! Archive authors name content by readable ids. The map assigns a GUID the
//! first time an id is seen and is saved beside the archive source so the
//! next build assigns the same GUIDs.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use cohort_core::Guid;
use snafu::ResultExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::DecodeSnafu;
use crate::error::EncodeSnafu;
use crate::error::IoSnafu;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ArchiveGuidMap {
    path: PathBuf,
    guids: BTreeMap<String, Guid>,
}

impl ArchiveGuidMap {
    /// An empty map that will be saved at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guids: BTreeMap::new(),
        }
    }

    /// Load the map saved at `path`. A missing file loads as empty.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(e) => return Err(e).context(IoSnafu { path }),
        };
        let guids = serde_json::from_slice(&bytes).context(DecodeSnafu { path: &path })?;
        Ok(Self { path, guids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// GUID for `id`, assigned on first use.
    pub fn guid(&mut self, id: &str) -> Guid {
        self.guids.entry(id.to_string()).or_insert_with(|| Guid::new(Uuid::new_v4().to_string())).clone()
    }

    pub fn get(&self, id: &str) -> Option<&Guid> {
        self.guids.get(id)
    }

    pub fn len(&self) -> usize {
        self.guids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// Write the map, replacing the file atomically. An empty map removes
    /// the file instead.
    pub async fn save(&self) -> Result<()> {
        if self.guids.is_empty() {
            debug!(path = %self.path.display(), "guid map empty, removing file");
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e).context(IoSnafu { path: &self.path }),
            };
        }
        let bytes = serde_json::to_vec_pretty(&self.guids).context(EncodeSnafu)?;
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        let temp = self.path.with_file_name(name);
        tokio::fs::write(&temp, &bytes).await.context(IoSnafu { path: &temp })?;
        tokio::fs::rename(&temp, &self.path).await.context(IoSnafu { path: &self.path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guids_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guids.json");

        let mut map = ArchiveGuidMap::load(&path).await.unwrap();
        assert!(map.is_empty());
        let asset = map.guid("type:Asset");
        assert_eq!(map.guid("type:Asset"), asset);
        assert_ne!(map.guid("type:Process"), asset);
        map.save().await.unwrap();

        let mut reloaded = ArchiveGuidMap::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.guid("type:Asset"), asset);
    }

    #[tokio::test]
    async fn test_empty_map_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guids.json");
        tokio::fs::write(&path, b"{}").await.unwrap();

        ArchiveGuidMap::new(&path).save().await.unwrap();
        assert!(!path.exists());
        ArchiveGuidMap::new(&path).save().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guids.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = ArchiveGuidMap::load(&path).await.unwrap_err();
        assert!(matches!(err, crate::error::ArchiveError::Decode { .. }));
    }
}
