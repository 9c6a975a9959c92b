//! Enterprise federation: answer queries from the whole cohort.
//!
//! The engine fans a query out to the local repository and every active or
//! stale member through their [`RepositoryConnector`](cohort_core::RepositoryConnector)s,
//! merges the answers so each GUID appears once, and reports members that
//! could not contribute in a manifest instead of failing.

pub mod audit_codes;
pub mod config;
pub mod engine;
pub mod factory;
pub mod merge;
pub mod result;

pub use config::FederationConfig;
pub use engine::EnterpriseFederationEngine;
pub use factory::ConnectorFactory;
pub use factory::ConnectorFactoryTable;
pub use merge::merge_instances;
pub use result::FederatedResult;
pub use result::ManifestEntry;
pub use result::MemberOutcome;
