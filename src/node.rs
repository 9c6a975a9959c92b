//! A running cohort member.
//!
//! ```text
//!            ┌─────────── event bus ───────────┐
//!            │ registry     typedef   instance │
//!            ▼                ▼          ▼     │
//!   RegistryEventHandler  TypeDef   Instance   │ publish
//!            │            Handler    Handler   │
//!            ▼                ▼          ▼     │
//!      CohortRegistry ◄─ TypeDefManager ◄─ ReplicationProcessor
//!            │                │               │
//!            └──► EnterpriseFederationEngine ◄┘──► local connector
//! ```
//!
//! Start-up order: identity, audit log, registry, TypeDefs seeded from the
//! local connector, configured archives, dispatchers, then the local
//! registration and TypeDef announcement. Dispatchers subscribe before the
//! registration is published so answers from peers are not missed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::ensure;
use cohort_archive::ArchiveLoader;
use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_audit::AuditLogStore;
use cohort_audit::FileAuditLogStore;
use cohort_audit::InMemoryAuditLogStore;
use cohort_core::MetadataCollectionId;
use cohort_core::RepositoryConnector;
use cohort_core::SystemTimeProvider;
use cohort_core::TimeProvider;
use cohort_events::CategoryDispatcher;
use cohort_events::DispatchStats;
use cohort_events::DispatcherHandle;
use cohort_events::EventBus;
use cohort_events::EventCategory;
use cohort_events::EventOriginator;
use cohort_events::EventPublisher;
use cohort_federation::ConnectorFactoryTable;
use cohort_federation::EnterpriseFederationEngine;
use cohort_registry::CohortRegistry;
use cohort_registry::FileRegistryStore;
use cohort_registry::LocalMember;
use cohort_registry::RegistryEventHandler;
use cohort_registry::spawn_refresh_loop;
use cohort_replication::InstanceEventHandler;
use cohort_replication::InstancePublisher;
use cohort_replication::InstanceReplicationProcessor;
use cohort_typedefs::TypeDefEventHandler;
use cohort_typedefs::TypeDefManager;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::audit_codes;
use crate::config::NodeConfig;
use crate::retention::RetentionSweeper;

/// Bound on stopping dispatchers and background loops.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CohortNode {
    config: NodeConfig,
    local_id: MetadataCollectionId,
    local: Arc<dyn RepositoryConnector>,
    audit: AuditLog,
    recent_audit: Arc<InMemoryAuditLogStore>,
    audit_store: Arc<FileAuditLogStore>,
    registry: Arc<CohortRegistry>,
    typedefs: Arc<TypeDefManager>,
    replication: Arc<InstanceReplicationProcessor>,
    instances: InstancePublisher,
    federation: Arc<EnterpriseFederationEngine>,
    archives: ArchiveLoader,
    retention: Arc<RetentionSweeper>,
    dispatchers: Vec<DispatcherHandle>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl CohortNode {
    /// Start a node on the system clock.
    pub async fn start(
        config: NodeConfig,
        bus: Arc<dyn EventBus>,
        local: Arc<dyn RepositoryConnector>,
        factories: ConnectorFactoryTable,
    ) -> Result<Self> {
        Self::start_with_time(config, bus, local, factories, Arc::new(SystemTimeProvider)).await
    }

    /// Start a node whose registry, events and audit records use `time`.
    ///
    /// # Errors
    /// Fails when the configuration is invalid, the local connector serves a
    /// different metadata collection, durable state cannot be opened, a
    /// configured archive cannot be loaded, or the local registration cannot
    /// be published.
    pub async fn start_with_time(
        config: NodeConfig,
        bus: Arc<dyn EventBus>,
        local: Arc<dyn RepositoryConnector>,
        factories: ConnectorFactoryTable,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let local_id = config.resolve_metadata_collection_id().await?;
        ensure!(
            local.metadata_collection_id() == &local_id,
            "local repository serves metadata collection {} but the node is configured for {}",
            local.metadata_collection_id(),
            local_id
        );
        let data_dir = config.data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let recent_audit = Arc::new(InMemoryAuditLogStore::new());
        let audit_path = config.audit_log_path();
        let audit_store = Arc::new(
            FileAuditLogStore::open(&audit_path)
                .await
                .with_context(|| format!("failed to open audit log {}", audit_path.display()))?,
        );
        let audit = AuditLog::new(
            config.server_name.clone(),
            local_id.clone(),
            vec![recent_audit.clone() as Arc<dyn AuditLogStore>, audit_store.clone() as Arc<dyn AuditLogStore>],
            time.clone(),
        )
        .for_component(AuditComponent::Node);

        let originator = EventOriginator {
            metadata_collection_id: local_id.clone(),
            server_name: config.server_name.clone(),
        };
        let publisher = EventPublisher::new(bus.clone(), originator, time.clone());

        let member = LocalMember {
            metadata_collection_id: local_id.clone(),
            server_name: config.server_name.clone(),
            connection: config.local_connection(),
        };
        let registry = CohortRegistry::open(
            member,
            config.registry_config(),
            Arc::new(FileRegistryStore::new(config.membership_path())),
            publisher.clone(),
            &audit,
            time,
        )
        .await
        .context("failed to open cohort registry")?;
        let registry = Arc::new(registry);

        local.start().await.context("failed to start local repository connector")?;
        let typedefs = Arc::new(TypeDefManager::new(publisher.clone(), &audit));
        let seeded = typedefs
            .seed_from_connector(local.as_ref())
            .await
            .context("failed to read TypeDefs from local repository")?;

        let replication =
            Arc::new(InstanceReplicationProcessor::new(local.clone(), typedefs.clone(), publisher.clone(), &audit));
        let instances = InstancePublisher::new(local.clone(), publisher, &audit);
        let federation = Arc::new(EnterpriseFederationEngine::new(
            local.clone(),
            registry.clone(),
            typedefs.clone(),
            factories,
            config.federation_config(),
            &audit,
        ));
        let archives = ArchiveLoader::new(local.clone(), typedefs.clone(), &audit);
        for path in &config.archives {
            let report = archives
                .load_archive_file(path)
                .await
                .with_context(|| format!("failed to load archive {}", path.display()))?;
            info!(archive = %path.display(), %report, "start-up archive loaded");
        }
        let retention = Arc::new(RetentionSweeper::new(registry.clone(), replication.clone(), federation.clone(), &audit));

        let cancel = CancellationToken::new();
        let workers = config.workers_per_category;
        let dispatchers = vec![
            CategoryDispatcher::new(EventCategory::Registry, local_id.clone(), workers, &audit).spawn(
                bus.as_ref(),
                Arc::new(RegistryEventHandler::new(registry.clone())),
                cancel.child_token(),
            ),
            CategoryDispatcher::new(EventCategory::TypeDef, local_id.clone(), workers, &audit).spawn(
                bus.as_ref(),
                Arc::new(TypeDefEventHandler::new(typedefs.clone())),
                cancel.child_token(),
            ),
            CategoryDispatcher::new(EventCategory::Instance, local_id.clone(), workers, &audit).spawn(
                bus.as_ref(),
                Arc::new(InstanceEventHandler::new(replication.clone())),
                cancel.child_token(),
            ),
        ];

        let mut node = Self {
            config,
            local_id,
            local,
            audit,
            recent_audit,
            audit_store,
            registry,
            typedefs,
            replication,
            instances,
            federation,
            archives,
            retention,
            dispatchers,
            tasks: Vec::new(),
            cancel,
        };

        if let Err(e) = node.join_cohort().await {
            node.stop_tasks().await;
            return Err(e);
        }
        node.tasks.push(spawn_refresh_loop(node.registry.clone(), node.cancel.child_token()));
        node.tasks.push(node.retention.clone().spawn(node.cancel.child_token()));

        let known = node.typedefs.list_typedefs().len();
        info!(
            server = %node.config.server_name,
            metadata_collection_id = %node.local_id,
            seeded,
            typedefs = known,
            archives = node.config.archives.len(),
            "cohort node started"
        );
        node.audit
            .log(&audit_codes::NODE_STARTED, &[
                &node.config.server_name,
                &node.local_id,
                &known,
                &node.config.archives.len(),
            ])
            .await;
        Ok(node)
    }

    async fn join_cohort(&self) -> Result<()> {
        self.registry.register_local().await.context("failed to register with the cohort")?;
        let announced = self.typedefs.announce_all().await.context("failed to announce TypeDefs")?;
        info!(announced, "local TypeDefs announced");
        Ok(())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn local_id(&self) -> &MetadataCollectionId {
        &self.local_id
    }

    pub fn local_connector(&self) -> &Arc<dyn RepositoryConnector> {
        &self.local
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Durable audit log.
    pub fn audit_store(&self) -> Arc<dyn AuditLogStore> {
        self.audit_store.clone()
    }

    /// Most recent audit records, in memory.
    pub fn recent_audit(&self) -> &Arc<InMemoryAuditLogStore> {
        &self.recent_audit
    }

    pub fn registry(&self) -> &Arc<CohortRegistry> {
        &self.registry
    }

    pub fn typedefs(&self) -> &Arc<TypeDefManager> {
        &self.typedefs
    }

    pub fn replication(&self) -> &Arc<InstanceReplicationProcessor> {
        &self.replication
    }

    /// Local instance changes, published to the cohort.
    pub fn instances(&self) -> &InstancePublisher {
        &self.instances
    }

    pub fn federation(&self) -> &Arc<EnterpriseFederationEngine> {
        &self.federation
    }

    pub fn archive_loader(&self) -> &ArchiveLoader {
        &self.archives
    }

    pub fn dispatch_stats(&self, category: EventCategory) -> Option<Arc<DispatchStats>> {
        self.dispatchers.iter().find(|d| d.category() == category).map(|d| d.stats().clone())
    }

    /// Run one retention sweep now instead of waiting for the next tick.
    pub async fn sweep_retention(&self) -> usize {
        self.retention.sweep_once().await
    }

    /// Leave the cohort and stop every background task.
    ///
    /// Waits at most [`SHUTDOWN_TIMEOUT`] for tasks; stragglers are aborted.
    pub async fn shutdown(mut self) {
        info!(server = %self.config.server_name, "cohort node shutting down");
        self.audit.log(&audit_codes::NODE_STOPPING, &[&self.config.server_name]).await;
        if let Err(e) = self.registry.unregister_local().await {
            warn!(error = %e, "failed to publish unregistration");
        }

        self.stop_tasks().await;
        self.federation.disconnect_all().await;
        if let Err(e) = self.local.disconnect().await {
            warn!(error = %e, "failed to disconnect local repository connector");
        }
        info!(server = %self.config.server_name, "cohort node stopped");
    }

    async fn stop_tasks(&mut self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        for dispatcher in self.dispatchers.drain(..) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            dispatcher.shutdown(remaining).await;
        }
        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                warn!("background task did not stop in time; aborting");
                abort.abort();
            }
        }
    }
}
