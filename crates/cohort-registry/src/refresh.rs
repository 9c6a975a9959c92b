//! Background refresh and sweep loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::registry::CohortRegistry;

/// Spawn the loop that refreshes the local registration and sweeps members
/// once per refresh interval until `cancel` fires.
pub fn spawn_refresh_loop(registry: Arc<CohortRegistry>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(refresh_loop(registry, cancel))
}

async fn refresh_loop(registry: Arc<CohortRegistry>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(registry.config().refresh_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; registration has just been sent.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("registry refresh loop shutting down");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = registry.refresh_local().await {
                    warn!(error = %e, "failed to publish registry refresh");
                }
                let changes = registry.sweep().await;
                if !changes.is_empty() {
                    debug!(changed = changes.len(), "registry sweep changed member states");
                }
            }
        }
    }
}
