//! The audit store contract.

use async_trait::async_trait;
use cohort_core::constants::MAX_AUDIT_QUERY_LIMIT;
use cohort_core::validate_paging;

use crate::error::AuditStoreError;
use crate::error::Result;
use crate::record::AuditComponent;
use crate::record::AuditLogRecord;
use crate::record::Severity;

/// Selection applied by a paged audit query. Time bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFilter {
    pub start_ms: u64,
    pub end_ms: u64,
    pub severity: Option<Severity>,
    pub component: Option<AuditComponent>,
}

impl AuditFilter {
    pub fn time_range(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms,
            severity: None,
            component: None,
        }
    }

    pub fn matches(&self, record: &AuditLogRecord) -> bool {
        record.timestamp_ms >= self.start_ms
            && record.timestamp_ms <= self.end_ms
            && self.severity.is_none_or(|s| s == record.severity)
            && self.component.is_none_or(|c| c == record.component)
    }
}

/// Validate paging parameters against [`MAX_AUDIT_QUERY_LIMIT`].
pub fn audit_page(offset: i64, limit: i64) -> Result<(usize, usize)> {
    validate_paging(offset, limit, MAX_AUDIT_QUERY_LIMIT).map_err(|_| AuditStoreError::Paging { offset, limit })
}

/// Apply `filter` and a validated page to records in timestamp order.
pub(crate) fn select_page<'a, I>(records: I, filter: &AuditFilter, offset: i64, limit: i64) -> Result<Vec<AuditLogRecord>>
where I: IntoIterator<Item = &'a AuditLogRecord> {
    let (offset, limit) = audit_page(offset, limit)?;
    let mut matching: Vec<&AuditLogRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    matching.sort_by_key(|r| r.timestamp_ms);
    Ok(matching.into_iter().skip(offset).take(limit).cloned().collect())
}

/// Append-only storage for audit records.
///
/// Implementations are interchangeable; callers only rely on this trait.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Append a record. Returns its id.
    async fn store(&self, record: AuditLogRecord) -> Result<String>;

    /// Fetch a record by id.
    async fn get_record(&self, record_id: &str) -> Result<Option<AuditLogRecord>>;

    /// Records matching `filter` in timestamp order, paged.
    ///
    /// # Errors
    /// [`AuditStoreError::Paging`] when `offset < 0`, `limit <= 0`, or
    /// `limit` exceeds [`MAX_AUDIT_QUERY_LIMIT`].
    async fn query(&self, filter: &AuditFilter, offset: i64, limit: i64) -> Result<Vec<AuditLogRecord>>;

    async fn get_by_time_range(&self, start_ms: u64, end_ms: u64, offset: i64, limit: i64) -> Result<Vec<AuditLogRecord>> {
        self.query(&AuditFilter::time_range(start_ms, end_ms), offset, limit).await
    }

    async fn get_by_severity(
        &self,
        severity: Severity,
        start_ms: u64,
        end_ms: u64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditLogRecord>> {
        let filter = AuditFilter {
            severity: Some(severity),
            ..AuditFilter::time_range(start_ms, end_ms)
        };
        self.query(&filter, offset, limit).await
    }

    async fn get_by_component(
        &self,
        component: AuditComponent,
        start_ms: u64,
        end_ms: u64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditLogRecord>> {
        let filter = AuditFilter {
            component: Some(component),
            ..AuditFilter::time_range(start_ms, end_ms)
        };
        self.query(&filter, offset, limit).await
    }
}
