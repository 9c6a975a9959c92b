//! Per-category dispatch to a fixed pool of worker tasks.
//!
//! ```text
//! bus ──► reader ──► decode ──► drop self/malformed
//!                      │
//!                      └─► worker[hash(originator) % N] ──► EventHandler
//! ```
//!
//! Routing by originator keeps each publisher's events in order while
//! different publishers are handled in parallel.

use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::CoreError;
use cohort_core::MetadataCollectionId;
use cohort_core::constants::MAX_MALFORMED_PAYLOAD_AUDIT_BYTES;
use cohort_core::constants::MAX_WORKERS_PER_CATEGORY;
use cohort_core::constants::WORKER_QUEUE_CAPACITY;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit_codes;
use crate::bus::EventBus;
use crate::bus::EventSubscription;
use crate::codec;
use crate::envelope::EventCategory;
use crate::envelope::EventEnvelope;

/// Consumer of decoded events for one category.
///
/// Delivery is at-least-once, so implementations must be idempotent. An
/// implementation that returns an error must already have audit-logged it.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), CoreError>;
}

/// Counters kept by one dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub received: AtomicU64,
    pub handled: AtomicU64,
    pub self_filtered: AtomicU64,
    pub malformed: AtomicU64,
    pub handler_errors: AtomicU64,
}

impl DispatchStats {
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Worker chosen for events from `originator`.
pub fn worker_index(originator: &MetadataCollectionId, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    originator.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

/// Running dispatcher for one category.
pub struct DispatcherHandle {
    category: EventCategory,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl DispatcherHandle {
    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Stop the reader and workers, waiting at most `timeout` in total.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + timeout;
        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                warn!(category = %self.category, "dispatcher task did not stop in time; aborting");
                abort.abort();
            }
        }
        debug!(category = %self.category, "dispatcher stopped");
    }
}

/// Dispatcher for one event category.
pub struct CategoryDispatcher {
    category: EventCategory,
    local_id: MetadataCollectionId,
    workers: usize,
    audit: AuditLog,
}

impl CategoryDispatcher {
    pub fn new(category: EventCategory, local_id: MetadataCollectionId, workers: usize, audit: &AuditLog) -> Self {
        Self {
            category,
            local_id,
            workers: workers.clamp(1, MAX_WORKERS_PER_CATEGORY),
            audit: audit.for_component(AuditComponent::EventBus),
        }
    }

    /// Subscribe to the bus and start the reader and worker tasks.
    ///
    /// The subscription is taken before returning, so events published after
    /// this call are delivered.
    pub fn spawn(self, bus: &dyn EventBus, handler: Arc<dyn EventHandler>, cancel: CancellationToken) -> DispatcherHandle {
        let subscription = bus.subscribe(self.category);
        let stats = Arc::new(DispatchStats::default());
        let mut tasks = Vec::with_capacity(self.workers + 1);
        let mut senders = Vec::with_capacity(self.workers);

        for worker in 0..self.workers {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
            senders.push(tx);
            tasks.push(tokio::spawn(worker_loop(
                self.category,
                worker,
                rx,
                handler.clone(),
                stats.clone(),
                cancel.clone(),
            )));
        }

        info!(category = %self.category, workers = self.workers, "event dispatcher started");
        let category = self.category;
        tasks.push(tokio::spawn(self.reader_loop(subscription, senders, stats.clone(), cancel.clone())));

        DispatcherHandle {
            category,
            cancel,
            tasks,
            stats,
        }
    }

    async fn reader_loop(
        self,
        mut subscription: EventSubscription,
        senders: Vec<mpsc::Sender<EventEnvelope>>,
        stats: Arc<DispatchStats>,
        cancel: CancellationToken,
    ) {
        loop {
            let raw = tokio::select! {
                _ = cancel.cancelled() => break,
                raw = subscription.recv() => raw,
            };
            let Some(raw) = raw else {
                debug!(category = %self.category, "event bus closed");
                break;
            };
            stats.received.fetch_add(1, Ordering::Relaxed);

            let envelope = match codec::decode(&raw).and_then(|e| self.check_category(e)) {
                Ok(envelope) => envelope,
                Err(err) => {
                    stats.malformed.fetch_add(1, Ordering::Relaxed);
                    self.audit_malformed(&raw, &err).await;
                    continue;
                }
            };

            if envelope.originator_id() == &self.local_id {
                stats.self_filtered.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let idx = worker_index(envelope.originator_id(), senders.len());
            let sent = tokio::select! {
                _ = cancel.cancelled() => break,
                sent = senders[idx].send(envelope) => sent,
            };
            if sent.is_err() {
                warn!(category = %self.category, worker = idx, "worker queue closed");
                break;
            }
        }
    }

    fn check_category(&self, envelope: EventEnvelope) -> Result<EventEnvelope, CoreError> {
        if envelope.category() != self.category {
            return Err(CoreError::malformed(format!(
                "{} event received on {} stream",
                envelope.category(),
                self.category
            )));
        }
        Ok(envelope)
    }

    async fn audit_malformed(&self, raw: &[u8], err: &CoreError) {
        let shown = &raw[..raw.len().min(MAX_MALFORMED_PAYLOAD_AUDIT_BYTES)];
        let payload = String::from_utf8_lossy(shown).into_owned();
        self.audit
            .log_with_info(&audit_codes::MALFORMED_EVENT, &[&self.category, err], vec![payload])
            .await;
    }
}

async fn worker_loop(
    category: EventCategory,
    worker: usize,
    mut queue: mpsc::Receiver<EventEnvelope>,
    handler: Arc<dyn EventHandler>,
    stats: Arc<DispatchStats>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = queue.recv() => envelope,
        };
        let Some(envelope) = envelope else {
            break;
        };
        let originator = envelope.originator_id().clone();
        match handler.handle(envelope).await {
            Ok(()) => {
                stats.handled.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.handler_errors.fetch_add(1, Ordering::Relaxed);
                debug!(%category, worker, originator = %originator, error = %e, "event handler returned error");
            }
        }
    }
    debug!(%category, worker, "dispatcher worker stopped");
}

#[cfg(test)]
mod tests {
    use cohort_core::SystemTimeProvider;
    use parking_lot::Mutex;

    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::envelope::EventOriginator;
    use crate::payload::RegistryEvent;
    use crate::publisher::EventPublisher;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, envelope: EventEnvelope) -> Result<(), CoreError> {
            self.seen.lock().push((envelope.originator_id().to_string(), envelope.timestamp_ms));
            Ok(())
        }
    }

    fn originator(id: &str) -> EventOriginator {
        EventOriginator {
            metadata_collection_id: id.into(),
            server_name: format!("server-{id}"),
        }
    }

    async fn wait_for(stats: &DispatchStats, handled: u64) {
        for _ in 0..200 {
            if stats.handled() + stats.malformed() >= handled {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_preserves_per_publisher_order_and_filters_self() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (audit, _store) = AuditLog::in_memory("local", "local".into());
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let handle = CategoryDispatcher::new(EventCategory::Registry, "local".into(), 4, &audit).spawn(
            bus.as_ref(),
            recorder.clone(),
            cancel.clone(),
        );

        for ts in 0..20u64 {
            for id in ["a", "b", "local"] {
                bus.publish(&EventEnvelope::new(originator(id), ts, RegistryEvent::RefreshRequest)).await.unwrap();
            }
        }
        wait_for(handle.stats(), 40).await;

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen.len(), 40);
        for id in ["a", "b"] {
            let stamps: Vec<u64> = seen.iter().filter(|(o, _)| o == id).map(|(_, ts)| *ts).collect();
            assert_eq!(stamps, (0..20).collect::<Vec<_>>());
        }
        assert_eq!(handle.stats().self_filtered.load(Ordering::Relaxed), 20);
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_malformed_events_are_audited_and_skipped() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (audit, store) = AuditLog::in_memory("local", "local".into());
        let recorder = Arc::new(Recorder::default());
        let handle = CategoryDispatcher::new(EventCategory::Registry, "local".into(), 1, &audit).spawn(
            bus.as_ref(),
            recorder.clone(),
            CancellationToken::new(),
        );

        bus.publish_raw(EventCategory::Registry, Arc::from(b"garbage".to_vec())).await.unwrap();
        let publisher = EventPublisher::new(bus.clone(), originator("a"), Arc::new(SystemTimeProvider));
        publisher.publish(RegistryEvent::RefreshRequest).await.unwrap();
        wait_for(handle.stats(), 2).await;

        let records = store.records_with_message_id(audit_codes::MALFORMED_EVENT.message_id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].additional_information, vec!["garbage".to_string()]);
        assert_eq!(records[0].component, AuditComponent::EventBus);
        assert_eq!(recorder.seen.lock().len(), 1);
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_worker_index_is_stable() {
        let id = MetadataCollectionId::new("repo-a");
        assert_eq!(worker_index(&id, 4), worker_index(&id, 4));
        assert_eq!(worker_index(&id, 1), 0);
        assert_eq!(worker_index(&id, 0), 0);
    }
}
