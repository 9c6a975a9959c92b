//! Retention of retired members' data.
//!
//! Once a retired member's retention period has passed, every reference copy
//! homed at it is removed from the local repository and its cached
//! connector is released. Its registration and audit trail stay.

use std::sync::Arc;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_federation::EnterpriseFederationEngine;
use cohort_registry::CohortRegistry;
use cohort_replication::InstanceReplicationProcessor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit_codes;

pub struct RetentionSweeper {
    registry: Arc<CohortRegistry>,
    replication: Arc<InstanceReplicationProcessor>,
    federation: Arc<EnterpriseFederationEngine>,
    audit: AuditLog,
}

impl RetentionSweeper {
    pub fn new(
        registry: Arc<CohortRegistry>,
        replication: Arc<InstanceReplicationProcessor>,
        federation: Arc<EnterpriseFederationEngine>,
        audit: &AuditLog,
    ) -> Self {
        Self {
            registry,
            replication,
            federation,
            audit: audit.for_component(AuditComponent::Node),
        }
    }

    /// Release connectors of retired members and purge reference copies of
    /// those past retention.
    ///
    /// # Returns
    /// Number of members whose copies were purged.
    pub async fn sweep_once(&self) -> usize {
        for id in self.federation.connected_members() {
            let retired = self.registry.get_member(&id).is_some_and(|m| m.state.is_retired());
            if retired {
                debug!(member = %id, "releasing connector of retired member");
                self.federation.forget_member(&id).await;
            }
        }

        let mut purged = 0;
        for id in self.registry.retired_past_retention() {
            match self.replication.purge_reference_copies(&id).await {
                Ok((entities, relationships)) => {
                    info!(member = %id, entities, relationships, "retention expired; reference copies purged");
                    self.registry.mark_reference_copies_purged(&id).await;
                    purged += 1;
                }
                Err(e) => {
                    warn!(member = %id, error = %e, "failed to purge reference copies");
                    self.audit.log(&audit_codes::RETENTION_PURGE_FAILED, &[&id, &e]).await;
                }
            }
        }
        purged
    }

    /// Sweep once per registry refresh interval until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.registry.config().refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("retention loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
        })
    }
}
