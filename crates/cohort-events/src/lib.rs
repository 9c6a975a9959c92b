//! Cohort event bus abstraction.
//!
//! Members exchange three categories of events: registry (membership),
//! typedef (type system) and instance (replication). Each event travels in a
//! versioned JSON envelope naming its originator. A receiver drops and
//! audit-logs anything it cannot parse and never fails the bus.

pub mod audit_codes;
pub mod bus;
pub mod codec;
pub mod dispatcher;
pub mod envelope;
mod legacy;
pub mod payload;
pub mod publisher;

pub use bus::EventBus;
pub use bus::EventSubscription;
pub use bus::InMemoryEventBus;
pub use bus::RawEvent;
pub use dispatcher::CategoryDispatcher;
pub use dispatcher::DispatchStats;
pub use dispatcher::DispatcherHandle;
pub use dispatcher::EventHandler;
pub use envelope::EventCategory;
pub use envelope::EventEnvelope;
pub use envelope::EventOriginator;
pub use envelope::PROTOCOL_VERSION;
pub use payload::EventPayload;
pub use payload::InstanceEvent;
pub use payload::RegistrationErrorCode;
pub use payload::RegistryEvent;
pub use payload::TypeDefEvent;
pub use publisher::EventPublisher;
