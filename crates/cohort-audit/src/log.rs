//! Component-scoped audit writer.

use std::fmt;
use std::sync::Arc;

use cohort_core::MetadataCollectionId;
use cohort_core::SystemTimeProvider;
use cohort_core::TimeProvider;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::memory::InMemoryAuditLogStore;
use crate::record::AuditCode;
use crate::record::AuditComponent;
use crate::record::AuditLogRecord;
use crate::record::AuditOriginator;
use crate::store::AuditLogStore;

/// Writes audit records for one component to every configured store.
///
/// Cheap to clone; clones share the stores. Each record is mirrored to
/// `tracing`. A store failure is logged and never propagated.
#[derive(Clone)]
pub struct AuditLog {
    originator: AuditOriginator,
    component: AuditComponent,
    stores: Arc<[Arc<dyn AuditLogStore>]>,
    time: Arc<dyn TimeProvider>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("originator", &self.originator)
            .field("component", &self.component)
            .field("stores", &self.stores.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new(
        server_name: impl Into<String>,
        metadata_collection_id: MetadataCollectionId,
        stores: Vec<Arc<dyn AuditLogStore>>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            originator: AuditOriginator {
                server_name: server_name.into(),
                metadata_collection_id,
            },
            component: AuditComponent::Node,
            stores: stores.into(),
            time,
        }
    }

    /// A log backed by a single fresh in-memory store, using the system clock.
    pub fn in_memory(
        server_name: impl Into<String>,
        metadata_collection_id: MetadataCollectionId,
    ) -> (Self, Arc<InMemoryAuditLogStore>) {
        let store = Arc::new(InMemoryAuditLogStore::new());
        let log = Self::new(server_name, metadata_collection_id, vec![store.clone()], Arc::new(SystemTimeProvider));
        (log, store)
    }

    /// The same stores and originator, stamped with another component.
    pub fn for_component(&self, component: AuditComponent) -> Self {
        Self {
            component,
            ..self.clone()
        }
    }

    pub fn component(&self) -> AuditComponent {
        self.component
    }

    pub fn originator(&self) -> &AuditOriginator {
        &self.originator
    }

    pub async fn log(&self, code: &AuditCode, params: &[&(dyn fmt::Display + Sync)]) -> AuditLogRecord {
        self.write(code, params, Vec::new(), None).await
    }

    pub async fn log_with_info(
        &self,
        code: &AuditCode,
        params: &[&(dyn fmt::Display + Sync)],
        additional_information: Vec<String>,
    ) -> AuditLogRecord {
        self.write(code, params, additional_information, None).await
    }

    pub async fn log_error(
        &self,
        code: &AuditCode,
        params: &[&(dyn fmt::Display + Sync)],
        err: &(dyn std::error::Error + Sync + '_),
    ) -> AuditLogRecord {
        self.write(code, params, Vec::new(), Some(err.to_string())).await
    }

    async fn write(
        &self,
        code: &AuditCode,
        params: &[&(dyn fmt::Display + Sync)],
        additional_information: Vec<String>,
        exception_detail: Option<String>,
    ) -> AuditLogRecord {
        let record = AuditLogRecord {
            record_id: Uuid::new_v4().to_string(),
            timestamp_ms: self.time.now_unix_ms(),
            originator: self.originator.clone(),
            component: self.component,
            severity: code.severity,
            message_id: code.message_id.to_string(),
            formatted_message: code.format(params),
            system_action: code.system_action.to_string(),
            user_action: code.user_action.to_string(),
            additional_information,
            exception_detail,
        };

        if code.severity.is_error() {
            error!(
                component = %self.component,
                message_id = code.message_id,
                severity = %code.severity,
                "{}",
                record.formatted_message
            );
        } else {
            info!(
                component = %self.component,
                message_id = code.message_id,
                severity = %code.severity,
                "{}",
                record.formatted_message
            );
        }

        for store in self.stores.iter() {
            if let Err(e) = store.store(record.clone()).await {
                warn!(message_id = code.message_id, error = %e, "failed to store audit record");
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use cohort_core::SimulatedTimeProvider;

    use super::*;
    use crate::error::AuditStoreError;
    use crate::error::Result;
    use crate::record::Severity;
    use crate::store::AuditFilter;

    const JOINED: AuditCode = AuditCode {
        message_id: "TEST-0100",
        severity: Severity::Event,
        message_template: "member {0} joined",
        system_action: "the member is tracked",
        user_action: "none",
    };

    struct BrokenStore;

    #[async_trait]
    impl AuditLogStore for BrokenStore {
        async fn store(&self, _record: AuditLogRecord) -> Result<String> {
            Err(AuditStoreError::Paging { offset: 0, limit: 0 })
        }

        async fn get_record(&self, _record_id: &str) -> Result<Option<AuditLogRecord>> {
            Ok(None)
        }

        async fn query(&self, _filter: &AuditFilter, _offset: i64, _limit: i64) -> Result<Vec<AuditLogRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_fans_out_and_stamps_component() {
        let a = Arc::new(InMemoryAuditLogStore::new());
        let b = Arc::new(InMemoryAuditLogStore::new());
        let time = Arc::new(SimulatedTimeProvider::new(5_000));
        let log = AuditLog::new("server-a", "repo-a".into(), vec![a.clone(), b.clone()], time)
            .for_component(AuditComponent::CohortRegistry);

        let record = log.log(&JOINED, &[&"repo-b"]).await;

        assert_eq!(record.formatted_message, "member repo-b joined");
        assert_eq!(record.timestamp_ms, 5_000);
        assert_eq!(record.component, AuditComponent::CohortRegistry);
        assert_eq!(a.records(), vec![record.clone()]);
        assert_eq!(b.get_record(&record.record_id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_propagated() {
        let good = Arc::new(InMemoryAuditLogStore::new());
        let log = AuditLog::new(
            "server-a",
            "repo-a".into(),
            vec![Arc::new(BrokenStore), good.clone()],
            Arc::new(SystemTimeProvider),
        );
        let err = std::io::Error::other("disk full");
        let record = log.log_error(&JOINED, &[&"repo-c"], &err).await;
        assert_eq!(record.exception_detail.as_deref(), Some("disk full"));
        assert_eq!(good.len(), 1);
    }
}
