use std::sync::Arc;

use async_trait::async_trait;
use cohort_core::CoreError;
use cohort_events::EventEnvelope;
use cohort_events::EventHandler;
use cohort_events::EventPayload;
use tracing::warn;

use crate::registry::CohortRegistry;

/// Feeds registry events from the bus into a [`CohortRegistry`].
pub struct RegistryEventHandler {
    registry: Arc<CohortRegistry>,
}

impl RegistryEventHandler {
    pub fn new(registry: Arc<CohortRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventHandler for RegistryEventHandler {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), CoreError> {
        match &envelope.payload {
            EventPayload::Registry(event) => {
                self.registry.process_remote_registry_event(&envelope.originator, event).await
            }
            other => {
                warn!(category = %other.category(), "non-registry event routed to registry handler");
                Ok(())
            }
        }
    }
}
