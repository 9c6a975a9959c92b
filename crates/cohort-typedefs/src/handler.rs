use std::sync::Arc;

use async_trait::async_trait;
use cohort_core::CoreError;
use cohort_events::EventEnvelope;
use cohort_events::EventHandler;
use cohort_events::EventPayload;
use tracing::warn;

use crate::manager::TypeDefManager;

/// Feeds TypeDef events from the bus into a [`TypeDefManager`].
pub struct TypeDefEventHandler {
    manager: Arc<TypeDefManager>,
}

impl TypeDefEventHandler {
    pub fn new(manager: Arc<TypeDefManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for TypeDefEventHandler {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), CoreError> {
        match &envelope.payload {
            EventPayload::TypeDef(event) => self.manager.process_remote_event(&envelope.originator, event).await,
            other => {
                warn!(category = %other.category(), "non-typedef event routed to typedef handler");
                Ok(())
            }
        }
    }
}
