//! The event bus contract and an in-process implementation.
//!
//! Delivery is at-least-once and ordered only within one publisher's
//! stream. The bus carries encoded bytes so every subscriber decodes exactly
//! as a remote member would.

use std::sync::Arc;

use async_trait::async_trait;
use cohort_core::CoreError;
use cohort_core::constants::EVENT_CHANNEL_CAPACITY;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::warn;

use crate::codec;
use crate::envelope::EventCategory;
use crate::envelope::EventEnvelope;

/// Encoded event as carried by a bus.
pub type RawEvent = Arc<[u8]>;

/// Receiving end of one category's stream.
pub struct EventSubscription {
    category: EventCategory,
    receiver: broadcast::Receiver<RawEvent>,
}

impl EventSubscription {
    pub fn new(category: EventCategory, receiver: broadcast::Receiver<RawEvent>) -> Self {
        Self { category, receiver }
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Next raw event, or `None` once the bus is closed.
    ///
    /// A lagging subscriber skips the overwritten events and continues.
    pub async fn recv(&mut self) -> Option<RawEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(raw) => return Some(raw),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(category = %self.category, skipped, "event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish already-encoded bytes on `category`.
    async fn publish_raw(&self, category: EventCategory, raw: RawEvent) -> Result<(), CoreError>;

    /// Subscribe to `category`. Only events published after this call are seen.
    fn subscribe(&self, category: EventCategory) -> EventSubscription;

    /// Encode and publish an envelope on its own category.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), CoreError> {
        let raw = codec::encode(envelope)?;
        self.publish_raw(envelope.category(), raw.into()).await
    }
}

/// Bus shared by every member in one process.
pub struct InMemoryEventBus {
    channels: [broadcast::Sender<RawEvent>; 3],
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: [
                broadcast::channel(capacity).0,
                broadcast::channel(capacity).0,
                broadcast::channel(capacity).0,
            ],
        }
    }

    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.channels[category.index()].receiver_count()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_raw(&self, category: EventCategory, raw: RawEvent) -> Result<(), CoreError> {
        if self.channels[category.index()].send(raw).is_err() {
            debug!(%category, "no subscribers for published event");
        }
        Ok(())
    }

    fn subscribe(&self, category: EventCategory) -> EventSubscription {
        EventSubscription::new(category, self.channels[category.index()].subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventOriginator;
    use crate::payload::RegistryEvent;

    #[tokio::test]
    async fn test_categories_are_isolated() {
        let bus = InMemoryEventBus::new();
        let mut registry = bus.subscribe(EventCategory::Registry);
        let mut instance = bus.subscribe(EventCategory::Instance);

        let envelope = EventEnvelope::new(
            EventOriginator {
                metadata_collection_id: "repo-a".into(),
                server_name: "server-a".to_string(),
            },
            1,
            RegistryEvent::RefreshRequest,
        );
        bus.publish(&envelope).await.unwrap();

        let raw = registry.recv().await.unwrap();
        assert_eq!(codec::decode(&raw).unwrap(), envelope);
        assert!(instance.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_continues() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventCategory::TypeDef);
        for i in 0u8..5 {
            bus.publish_raw(EventCategory::TypeDef, Arc::from(vec![i])).await.unwrap();
        }
        let first = sub.recv().await.unwrap();
        assert_eq!(&*first, &[3u8]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::new();
        assert!(bus.publish_raw(EventCategory::Instance, Arc::from(vec![1u8])).await.is_ok());
        assert_eq!(bus.subscriber_count(EventCategory::Instance), 0);
    }
}
