//! JSON-lines audit store.
//!
//! Each record is appended as one line. Reads scan the whole file; lines that
//! fail to parse are skipped with a warning so a torn final write never
//! hides earlier records.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::EncodeSnafu;
use crate::error::IoSnafu;
use crate::error::Result;
use crate::record::AuditLogRecord;
use crate::store::AuditFilter;
use crate::store::AuditLogStore;
use crate::store::audit_page;
use crate::store::select_page;

pub struct FileAuditLogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditLogStore {
    /// Open a store at `path`, creating parent directories as needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.context(IoSnafu { path: parent })?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<AuditLogRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(IoSnafu { path: &self.path }),
        };
        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %self.path.display(), line = line_no + 1, error = %e, "skipping unreadable audit record"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditLogStore for FileAuditLogStore {
    async fn store(&self, record: AuditLogRecord) -> Result<String> {
        let mut line = serde_json::to_vec(&record).context(EncodeSnafu)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(IoSnafu { path: &self.path })?;
        file.write_all(&line).await.context(IoSnafu { path: &self.path })?;
        file.flush().await.context(IoSnafu { path: &self.path })?;
        Ok(record.record_id)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<AuditLogRecord>> {
        Ok(self.read_all().await?.into_iter().find(|r| r.record_id == record_id))
    }

    async fn query(&self, filter: &AuditFilter, offset: i64, limit: i64) -> Result<Vec<AuditLogRecord>> {
        audit_page(offset, limit)?;
        let records = self.read_all().await?;
        select_page(records.iter(), filter, offset, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditStoreError;
    use crate::record::AuditComponent;
    use crate::record::AuditOriginator;
    use crate::record::Severity;

    fn record(id: &str, ts: u64) -> AuditLogRecord {
        AuditLogRecord {
            record_id: id.to_string(),
            timestamp_ms: ts,
            originator: AuditOriginator {
                server_name: "server-a".to_string(),
                metadata_collection_id: "repo-a".into(),
            },
            component: AuditComponent::ArchiveLoader,
            severity: Severity::Information,
            message_id: "TEST-0002".to_string(),
            formatted_message: "loaded".to_string(),
            system_action: String::new(),
            user_action: String::new(),
            additional_information: vec!["detail".to_string()],
            exception_detail: None,
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.jsonl");

        let store = FileAuditLogStore::open(&path).await.unwrap();
        store.store(record("r1", 10)).await.unwrap();
        store.store(record("r2", 20)).await.unwrap();
        drop(store);

        let reopened = FileAuditLogStore::open(&path).await.unwrap();
        let all = reopened.get_by_time_range(0, 100, 0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(reopened.get_record("r2").await.unwrap().unwrap().additional_information, vec!["detail"]);
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let store = FileAuditLogStore::open(&path).await.unwrap();
        store.store(record("r1", 10)).await.unwrap();
        tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap().write_all(b"{\"record_id\":").await.unwrap();

        assert_eq!(store.get_by_time_range(0, 100, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_paging_checked_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAuditLogStore::open(dir.path().join("missing.jsonl")).await.unwrap();
        assert!(matches!(store.get_by_time_range(0, 1, 0, -5).await, Err(AuditStoreError::Paging { .. })));
        assert!(store.get_by_time_range(0, 1, 0, 5).await.unwrap().is_empty());
    }
}
