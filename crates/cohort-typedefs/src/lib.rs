//! TypeDef negotiation for a cohort member.
//!
//! Every member holds its own copy of the cohort type system. Definitions
//! announced by peers are adopted, upgraded or rejected as conflicts; a type
//! with an open conflict is excluded from federation and replication until
//! an administrator resolves it.

pub mod audit_codes;
pub mod handler;
pub mod manager;

pub use handler::TypeDefEventHandler;
pub use manager::TypeDefConflictRecord;
pub use manager::TypeDefManager;
pub use manager::TypeDefOutcome;
