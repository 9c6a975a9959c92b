//! Test harness for cohort components.
//!
//! - [`TestCohort`]: members sharing one in-memory bus, one connector
//!   directory and one simulated clock
//! - [`SlowConnector`], [`FailingConnector`]: fault injection at the
//!   connector seam
//! - [`ConnectorDirectory`]: resolves `in-memory` descriptors to connectors
//! - [`wait_until`]: poll a condition instead of sleeping
//!
//! ```ignore
//! let cohort = TestCohort::new();
//! let a = cohort.add_member("a").await?;
//! cohort.directory().insert("b", Arc::new(SlowConnector::new(b_repo, Duration::from_secs(5))));
//! a.admit("b").await?;
//! ```

pub mod cohort;
pub mod connectors;
pub mod directory;
pub mod wait;

pub use cohort::START_MS;
pub use cohort::TestCohort;
pub use cohort::TestMember;
pub use cohort::originator;
pub use connectors::FailingConnector;
pub use connectors::SlowConnector;
pub use directory::ConnectorDirectory;
pub use directory::IN_MEMORY_CONNECTOR;
pub use wait::wait_until;
