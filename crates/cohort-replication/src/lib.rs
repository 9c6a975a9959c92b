//! Instance replication between cohort members.
//!
//! The home repository of an instance is the only member allowed to change
//! it. Other members keep reference copies current by applying the home's
//! instance events, newest version wins:
//!
//! ```text
//!   home                         member
//!   InstancePublisher ──event──► InstanceReplicationProcessor ──► local store
//!                     ◄─refresh request──
//! ```

pub mod audit_codes;
pub mod handler;
pub mod processor;
pub mod publisher;
mod replica;
mod tombstones;

pub use handler::InstanceEventHandler;
pub use processor::InstanceReplicationProcessor;
pub use processor::ReplicationOutcome;
pub use processor::ReplicationStats;
pub use publisher::InstancePublisher;
