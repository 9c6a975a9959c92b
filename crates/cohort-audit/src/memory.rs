//! In-memory audit store.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::record::AuditLogRecord;
use crate::store::AuditFilter;
use crate::store::AuditLogStore;
use crate::store::select_page;

/// Records retained before the oldest are evicted.
pub const MAX_IN_MEMORY_AUDIT_RECORDS: usize = 100_000;

/// Bounded in-memory audit store.
pub struct InMemoryAuditLogStore {
    records: RwLock<VecDeque<AuditLogRecord>>,
    capacity: usize,
}

impl Default for InMemoryAuditLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_IN_MEMORY_AUDIT_RECORDS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Every retained record, oldest first.
    pub fn records(&self) -> Vec<AuditLogRecord> {
        self.records.read().iter().cloned().collect()
    }

    /// Retained records with the given message id.
    pub fn records_with_message_id(&self, message_id: &str) -> Vec<AuditLogRecord> {
        self.records.read().iter().filter(|r| r.message_id == message_id).cloned().collect()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn store(&self, record: AuditLogRecord) -> Result<String> {
        let id = record.record_id.clone();
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            if let Some(evicted) = records.pop_front() {
                debug!(record_id = %evicted.record_id, capacity = self.capacity, "audit store full, oldest record evicted");
            }
        }
        records.push_back(record);
        Ok(id)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<AuditLogRecord>> {
        Ok(self.records.read().iter().find(|r| r.record_id == record_id).cloned())
    }

    async fn query(&self, filter: &AuditFilter, offset: i64, limit: i64) -> Result<Vec<AuditLogRecord>> {
        let records = self.records.read();
        select_page(records.iter(), filter, offset, limit)
    }
}

#[cfg(test)]
mod tests {
    use cohort_core::CoreError;

    use super::*;
    use crate::error::AuditStoreError;
    use crate::record::AuditComponent;
    use crate::record::AuditOriginator;
    use crate::record::Severity;

    fn record(id: &str, ts: u64, severity: Severity, component: AuditComponent) -> AuditLogRecord {
        AuditLogRecord {
            record_id: id.to_string(),
            timestamp_ms: ts,
            originator: AuditOriginator {
                server_name: "server-a".to_string(),
                metadata_collection_id: "repo-a".into(),
            },
            component,
            severity,
            message_id: "TEST-0001".to_string(),
            formatted_message: format!("record {id}"),
            system_action: String::new(),
            user_action: String::new(),
            additional_information: Vec::new(),
            exception_detail: None,
        }
    }

    async fn seeded() -> InMemoryAuditLogStore {
        let store = InMemoryAuditLogStore::new();
        store.store(record("r3", 30, Severity::Error, AuditComponent::Federation)).await.unwrap();
        store.store(record("r1", 10, Severity::Information, AuditComponent::CohortRegistry)).await.unwrap();
        store.store(record("r2", 20, Severity::Error, AuditComponent::CohortRegistry)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_time_range_is_ordered_and_paged() {
        let store = seeded().await;
        let all = store.get_by_time_range(0, 100, 0, 10).await.unwrap();
        assert_eq!(all.iter().map(|r| r.record_id.as_str()).collect::<Vec<_>>(), ["r1", "r2", "r3"]);

        let page = store.get_by_time_range(0, 100, 1, 1).await.unwrap();
        assert_eq!(page[0].record_id, "r2");

        let bounded = store.get_by_time_range(15, 25, 0, 10).await.unwrap();
        assert_eq!(bounded.len(), 1);
    }

    #[tokio::test]
    async fn test_severity_and_component_filters() {
        let store = seeded().await;
        assert_eq!(store.get_by_severity(Severity::Error, 0, 100, 0, 10).await.unwrap().len(), 2);
        let registry = store.get_by_component(AuditComponent::CohortRegistry, 0, 100, 0, 10).await.unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_paging_is_rejected() {
        let store = seeded().await;
        let err = store.get_by_time_range(0, 100, -1, 10).await.unwrap_err();
        assert!(matches!(err, AuditStoreError::Paging { offset: -1, limit: 10 }));
        assert!(store.get_by_time_range(0, 100, 0, 0).await.is_err());
        assert_eq!(
            CoreError::from(store.get_by_time_range(0, 100, 0, 0).await.unwrap_err()),
            CoreError::PagingError { offset: 0, limit: 0 }
        );
    }

    #[tokio::test]
    async fn test_get_record_and_eviction() {
        let store = InMemoryAuditLogStore::with_capacity(2);
        store.store(record("a", 1, Severity::Event, AuditComponent::Node)).await.unwrap();
        store.store(record("b", 2, Severity::Event, AuditComponent::Node)).await.unwrap();
        store.store(record("c", 3, Severity::Event, AuditComponent::Node)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get_record("a").await.unwrap().is_none());
        assert_eq!(store.get_record("c").await.unwrap().unwrap().timestamp_ms, 3);
    }

    #[tokio::test]
    async fn test_full_store_evicts_one_record_per_insert() {
        let store = InMemoryAuditLogStore::with_capacity(3);
        for (i, id) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            store.store(record(id, i as u64, Severity::Event, AuditComponent::Node)).await.unwrap();
            assert_eq!(store.len(), (i + 1).min(3));
        }
        let ids: Vec<String> = store.records().into_iter().map(|r| r.record_id).collect();
        assert_eq!(ids, ["c", "d", "e"]);
    }
}
