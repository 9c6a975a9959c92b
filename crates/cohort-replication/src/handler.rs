use std::sync::Arc;

use async_trait::async_trait;
use cohort_core::CoreError;
use cohort_events::EventEnvelope;
use cohort_events::EventHandler;
use cohort_events::EventPayload;
use tracing::warn;

use crate::processor::InstanceReplicationProcessor;

/// Feeds instance events from the bus into an
/// [`InstanceReplicationProcessor`].
pub struct InstanceEventHandler {
    processor: Arc<InstanceReplicationProcessor>,
}

impl InstanceEventHandler {
    pub fn new(processor: Arc<InstanceReplicationProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl EventHandler for InstanceEventHandler {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), CoreError> {
        match &envelope.payload {
            EventPayload::Instance(event) => {
                self.processor.process_event(&envelope.originator, event).await?;
                Ok(())
            }
            other => {
                warn!(category = %other.category(), "non-instance event routed to instance handler");
                Ok(())
            }
        }
    }
}
