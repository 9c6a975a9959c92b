//! Cohort membership registry.
//!
//! Tracks the local registration and every remote member discovered through
//! registry events. Members move through
//! `Announced → Active → Stale → Retired`; only active and stale members
//! receive federated queries. Conflicting registrations are rejected and
//! audit-logged, never silently replaced.

pub mod audit_codes;
pub mod config;
pub mod handler;
pub mod refresh;
pub mod registry;
pub mod store;

pub use config::RegistryConfig;
pub use handler::RegistryEventHandler;
pub use refresh::spawn_refresh_loop;
pub use registry::CohortRegistry;
pub use registry::LocalMember;
pub use store::FileRegistryStore;
pub use store::InMemoryRegistryStore;
pub use store::RegistryStore;
pub use store::RegistryStoreError;
