//! Error types for audit log stores.

use std::path::PathBuf;

use cohort_core::CoreError;
use snafu::Snafu;

/// Result type for audit store operations.
pub type Result<T, E = AuditStoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AuditStoreError {
    /// Offset or limit out of range on a paged query.
    #[snafu(display("invalid paging parameters: offset={}, limit={}", offset, limit))]
    Paging {
        /// Requested offset.
        offset: i64,
        /// Requested page size.
        limit: i64,
    },

    /// Reading or appending the log file failed.
    #[snafu(display("audit log I/O on {}: {}", path.display(), source))]
    Io {
        /// Log file.
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record could not be serialized.
    #[snafu(display("failed to encode audit record: {}", source))]
    Encode { source: serde_json::Error },
}

impl From<AuditStoreError> for CoreError {
    fn from(err: AuditStoreError) -> Self {
        match err {
            AuditStoreError::Paging { offset, limit } => CoreError::PagingError { offset, limit },
            other => CoreError::storage(other),
        }
    }
}
