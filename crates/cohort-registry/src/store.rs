//! Durable storage of the cohort membership record.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use cohort_core::CohortMembership;
use cohort_core::CoreError;
use parking_lot::Mutex;
use snafu::ResultExt;
use snafu::Snafu;

pub type Result<T, E = RegistryStoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistryStoreError {
    #[snafu(display("registry store I/O on {}: {}", path.display(), source))]
    Io { path: PathBuf, source: std::io::Error },

    #[snafu(display("registry store {} is corrupt: {}", path.display(), source))]
    Decode { path: PathBuf, source: serde_json::Error },

    #[snafu(display("failed to encode cohort membership: {}", source))]
    Encode { source: serde_json::Error },
}

impl From<RegistryStoreError> for CoreError {
    fn from(err: RegistryStoreError) -> Self {
        CoreError::storage(err)
    }
}

/// Persistence for the registry's [`CohortMembership`].
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load the saved membership. An absent record loads as empty.
    async fn load(&self) -> Result<CohortMembership>;

    /// Replace the saved membership.
    async fn save(&self, membership: &CohortMembership) -> Result<()>;
}

/// Membership kept in memory only.
#[derive(Default)]
pub struct InMemoryRegistryStore {
    membership: Mutex<CohortMembership>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_membership(membership: CohortMembership) -> Self {
        Self {
            membership: Mutex::new(membership),
        }
    }

    pub fn current(&self) -> CohortMembership {
        self.membership.lock().clone()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn load(&self) -> Result<CohortMembership> {
        Ok(self.membership.lock().clone())
    }

    async fn save(&self, membership: &CohortMembership) -> Result<()> {
        *self.membership.lock() = membership.clone();
        Ok(())
    }
}

/// Membership saved as one JSON document, replaced atomically.
pub struct FileRegistryStore {
    path: PathBuf,
}

impl FileRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for FileRegistryStore {
    async fn load(&self) -> Result<CohortMembership> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CohortMembership::default()),
            Err(e) => return Err(e).context(IoSnafu { path: &self.path }),
        };
        serde_json::from_slice(&bytes).context(DecodeSnafu { path: &self.path })
    }

    async fn save(&self, membership: &CohortMembership) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(membership).context(EncodeSnafu)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.context(IoSnafu { path: parent })?;
            }
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await.context(IoSnafu { path: &temp })?;
        tokio::fs::rename(&temp, &self.path).await.context(IoSnafu { path: &self.path })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cohort_core::ConnectionDescriptor;
    use cohort_core::MemberRegistration;
    use cohort_core::MemberState;
    use cohort_core::RemoteMember;

    use super::*;

    fn membership() -> CohortMembership {
        let local = MemberRegistration::new("local".into(), "server-local", ConnectionDescriptor::new("in-memory", "local"), 1);
        let mut remote = RemoteMember::announced(MemberRegistration::new(
            "remote".into(),
            "server-remote",
            ConnectionDescriptor::new("in-memory", "remote"),
            2,
        ));
        remote.state = MemberState::Retired;
        CohortMembership {
            local_registration: Some(local),
            remote_members: vec![remote],
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trips_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRegistryStore::new(dir.path().join("state").join("cohort.json"));
        assert_eq!(store.load().await.unwrap(), CohortMembership::default());

        store.save(&membership()).await.unwrap();
        let reopened = FileRegistryStore::new(store.path());
        assert_eq!(reopened.load().await.unwrap(), membership());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let err = FileRegistryStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, RegistryStoreError::Decode { .. }));
        assert!(matches!(CoreError::from(err), CoreError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryRegistryStore::new();
        store.save(&membership()).await.unwrap();
        assert_eq!(store.current(), membership());
    }
}
