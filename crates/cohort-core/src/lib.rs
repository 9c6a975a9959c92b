//! Shared model for metadata repository cohorts.
//!
//! A cohort is a loosely-coupled federation of independently operated
//! metadata repositories. This crate holds what every cohort component
//! agrees on:
//!
//! - identifiers ([`MetadataCollectionId`], [`Guid`])
//! - membership records ([`MemberRegistration`], [`CohortMembership`])
//! - the type system ([`TypeDef`], [`TypeDefPatch`])
//! - instances with provenance ([`Entity`], [`Relationship`])
//! - the connector contract ([`RepositoryConnector`]) and an in-memory
//!   implementation
//! - the error taxonomy ([`CoreError`])
//! - an injectable clock ([`TimeProvider`])

pub mod connector;
pub mod constants;
pub mod error;
pub mod ids;
pub mod instance;
pub mod memory;
pub mod registration;
pub mod time;
pub mod typedef;

pub use connector::RepositoryConnector;
pub use connector::SaveOutcome;
pub use error::ConflictKind;
pub use error::CoreError;
pub use error::validate_paging;
pub use ids::Guid;
pub use ids::MetadataCollectionId;
pub use instance::Entity;
pub use instance::Instance;
pub use instance::InstanceHeader;
pub use instance::InstanceStatus;
pub use instance::MatchCriteria;
pub use instance::Relationship;
pub use instance::SearchCriteria;
pub use instance::SequencingOrder;
pub use memory::InMemoryRepository;
pub use registration::CohortMembership;
pub use registration::ConnectionDescriptor;
pub use registration::MemberRegistration;
pub use registration::MemberState;
pub use registration::RemoteMember;
#[cfg(feature = "simulation")]
pub use time::SimulatedTimeProvider;
pub use time::SystemTimeProvider;
pub use time::TimeProvider;
pub use time::current_time_ms;
pub use typedef::TypeDef;
pub use typedef::TypeDefAttribute;
pub use typedef::TypeDefCategory;
pub use typedef::TypeDefCompatibility;
pub use typedef::TypeDefPatch;
