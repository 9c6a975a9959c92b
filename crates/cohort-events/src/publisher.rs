use std::fmt;
use std::sync::Arc;

use cohort_core::CoreError;
use cohort_core::MetadataCollectionId;
use cohort_core::TimeProvider;
use tracing::debug;

use crate::bus::EventBus;
use crate::envelope::EventEnvelope;
use crate::envelope::EventOriginator;
use crate::payload::EventPayload;

/// Stamps outbound payloads with the local originator and publishes them.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    originator: EventOriginator,
    time: Arc<dyn TimeProvider>,
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher").field("originator", &self.originator).finish_non_exhaustive()
    }
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, originator: EventOriginator, time: Arc<dyn TimeProvider>) -> Self {
        Self { bus, originator, time }
    }

    pub fn local_id(&self) -> &MetadataCollectionId {
        &self.originator.metadata_collection_id
    }

    pub fn originator(&self) -> &EventOriginator {
        &self.originator
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_unix_ms()
    }

    pub async fn publish(&self, payload: impl Into<EventPayload>) -> Result<(), CoreError> {
        let envelope = EventEnvelope::new(self.originator.clone(), self.time.now_unix_ms(), payload);
        debug!(category = %envelope.category(), "publishing event");
        self.bus.publish(&envelope).await
    }
}
