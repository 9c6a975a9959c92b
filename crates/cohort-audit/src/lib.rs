//! Audit log for cohort components.
//!
//! Every component boundary that swallows or returns an error writes an
//! audit record first. Records are append-only and queryable by time range,
//! severity and component through the [`AuditLogStore`] contract.
//!
//! ```text
//! component ──► AuditLog ──┬──► tracing (error!/info!)
//!                          ├──► InMemoryAuditLogStore
//!                          └──► FileAuditLogStore (JSON lines)
//! ```

pub mod error;
pub mod file;
pub mod log;
pub mod memory;
pub mod record;
pub mod store;

pub use error::AuditStoreError;
pub use file::FileAuditLogStore;
pub use log::AuditLog;
pub use memory::InMemoryAuditLogStore;
pub use record::AuditCode;
pub use record::AuditComponent;
pub use record::AuditLogRecord;
pub use record::AuditOriginator;
pub use record::Severity;
pub use store::AuditFilter;
pub use store::AuditLogStore;
