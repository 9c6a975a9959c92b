//! Fixed resource limits shared by every cohort component.
//!
//! All limits are explicit and bounded so that a misbehaving peer cannot
//! drive a member into unbounded memory or wait times.

use std::time::Duration;

// ============================================================================
// Constants (Tiger Style: Fixed limits)
// ============================================================================

/// Largest page a federated query may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Largest page an audit log query may request.
pub const MAX_AUDIT_QUERY_LIMIT: usize = 10_000;

/// Maximum encoded size of a single event envelope (1 MiB).
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Maximum number of remote members tracked by one registry.
pub const MAX_TRACKED_MEMBERS: usize = 1024;

/// Maximum number of attributes on a single TypeDef.
pub const MAX_ATTRIBUTES_PER_TYPEDEF: usize = 256;

/// Maximum length of a TypeDef or attribute name.
pub const MAX_NAME_LENGTH: usize = 256;

/// Upper bound on instances scanned by a bulk connector operation.
pub const MAX_BULK_SCAN: usize = 100_000;

/// Default interval between registry refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of consecutive missed refreshes before a member is retired.
pub const DEFAULT_MISSED_REFRESHES_BEFORE_RETIRE: u32 = 3;

/// Default time reference copies of a retired member are kept.
pub const DEFAULT_RETENTION_AFTER_RETIRE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default bound on a single remote connector call during federation.
pub const DEFAULT_MEMBER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of worker tasks per event category.
pub const DEFAULT_WORKERS_PER_CATEGORY: usize = 2;

/// Maximum number of worker tasks per event category.
pub const MAX_WORKERS_PER_CATEGORY: usize = 16;

/// Capacity of each per-category broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of each dispatcher worker queue.
pub const WORKER_QUEUE_CAPACITY: usize = 256;

/// Bytes of a malformed payload kept in its audit record.
pub const MAX_MALFORMED_PAYLOAD_AUDIT_BYTES: usize = 512;

/// Maximum number of tombstones kept by the replication processor.
pub const MAX_TOMBSTONES: usize = 65_536;

/// Maximum number of (instance, member) pairs remembered as already told
/// about an instance conflict.
pub const MAX_REPORTED_INSTANCE_CONFLICTS: usize = 4096;
