//! Cohort member node.
//!
//! Wires the cohort crates into one running member: configuration loading,
//! start-up and shutdown, and the retention sweep for retired members.
//!
//! # Configuration layers
//!
//! Environment (`COHORT_*`) < TOML file < CLI arguments; see [`load_config`].

pub mod audit_codes;
pub mod config;
pub mod node;
pub mod retention;

pub use config::ConfigError;
pub use config::NodeConfig;
pub use config::load_config;
pub use node::CohortNode;
pub use retention::RetentionSweeper;
