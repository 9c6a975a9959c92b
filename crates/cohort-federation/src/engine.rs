//! Federated queries across the cohort.
//!
//! ```text
//!                       ┌──► local connector ───────┐
//! federated_find ──────►├──► active member  ────────┤── merge by GUID ──► page
//!   (one deadline)      └──► stale member (last) ───┘        │
//!                                                    exclusion filter
//! ```
//!
//! Every call runs all members concurrently under a single deadline. A
//! member that errors, times out or cannot be reached is named in the
//! manifest and never fails the call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use cohort_audit::AuditComponent;
use cohort_audit::AuditLog;
use cohort_core::ConnectionDescriptor;
use cohort_core::CoreError;
use cohort_core::Entity;
use cohort_core::Guid;
use cohort_core::Instance;
use cohort_core::MetadataCollectionId;
use cohort_core::Relationship;
use cohort_core::RemoteMember;
use cohort_core::RepositoryConnector;
use cohort_core::SearchCriteria;
use cohort_core::SequencingOrder;
use cohort_registry::CohortRegistry;
use cohort_typedefs::TypeDefManager;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit_codes;
use crate::config::FederationConfig;
use crate::factory::ConnectorFactoryTable;
use crate::merge::merge_instances;
use crate::result::FederatedResult;
use crate::result::ManifestEntry;
use crate::result::MemberOutcome;

struct CachedConnector {
    descriptor: ConnectionDescriptor,
    connector: Arc<dyn RepositoryConnector>,
}

/// One member a federated call is dispatched to.
struct Target {
    id: MetadataCollectionId,
    connector: Arc<dyn RepositoryConnector>,
    needs_start: bool,
    remote: bool,
}

/// Raw per-member answers before merging.
struct FanOut<T> {
    responses: Vec<(MetadataCollectionId, T)>,
    manifest: Vec<ManifestEntry>,
    responded: Vec<MetadataCollectionId>,
}

pub struct EnterpriseFederationEngine {
    local: Arc<dyn RepositoryConnector>,
    registry: Arc<CohortRegistry>,
    typedefs: Arc<TypeDefManager>,
    factories: ConnectorFactoryTable,
    connectors: RwLock<HashMap<MetadataCollectionId, CachedConnector>>,
    config: FederationConfig,
    audit: AuditLog,
}

impl EnterpriseFederationEngine {
    pub fn new(
        local: Arc<dyn RepositoryConnector>,
        registry: Arc<CohortRegistry>,
        typedefs: Arc<TypeDefManager>,
        factories: ConnectorFactoryTable,
        config: FederationConfig,
        audit: &AuditLog,
    ) -> Self {
        Self {
            local,
            registry,
            typedefs,
            factories,
            connectors: RwLock::new(HashMap::new()),
            config,
            audit: audit.for_component(AuditComponent::Federation),
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Members with a cached connector, sorted.
    pub fn connected_members(&self) -> Vec<MetadataCollectionId> {
        let mut ids: Vec<_> = self.connectors.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // Federated operations
    // ========================================================================

    /// Find entities across the local repository and every active or stale
    /// member.
    ///
    /// # Errors
    /// [`CoreError::PagingError`] for a page size of zero or above the
    /// configured maximum.
    pub async fn federated_find(
        &self,
        criteria: &SearchCriteria,
        page_size: usize,
    ) -> Result<FederatedResult<Entity>, CoreError> {
        self.federated_find_with_cancel(criteria, page_size, &CancellationToken::new()).await
    }

    /// [`federated_find`](Self::federated_find) that stops early when
    /// `cancel` fires.
    ///
    /// # Errors
    /// [`CoreError::Cancelled`] if `cancel` fires before every member has
    /// answered or the deadline passed.
    pub async fn federated_find_with_cancel(
        &self,
        criteria: &SearchCriteria,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> Result<FederatedResult<Entity>, CoreError> {
        self.check_page_size("find", page_size).await?;
        let shared = Arc::new(criteria.clone());
        let fan_out = self
            .fan_out(
                "find",
                move |connector| {
                    let criteria = shared.clone();
                    async move { connector.find_entities(&criteria, page_size).await }
                },
                cancel,
            )
            .await?;
        Ok(self.assemble(fan_out, criteria.sequencing, page_size))
    }

    /// Fetch one entity from whichever members hold it. The winning copy is
    /// the result's only instance.
    pub async fn federated_get_entity(&self, guid: &Guid) -> Result<FederatedResult<Entity>, CoreError> {
        let guid = guid.clone();
        let fan_out = self
            .fan_out(
                "get entity",
                move |connector| {
                    let guid = guid.clone();
                    async move { connector.get_entity(&guid).await.map(|found| found.into_iter().collect::<Vec<_>>()) }
                },
                &CancellationToken::new(),
            )
            .await?;
        Ok(self.assemble(fan_out, SequencingOrder::Guid, 1))
    }

    /// Relationships touching `entity`, merged across members.
    pub async fn federated_relationships_for_entity(
        &self,
        entity: &Guid,
        page_size: usize,
    ) -> Result<FederatedResult<Relationship>, CoreError> {
        self.check_page_size("relationships for entity", page_size).await?;
        let entity = entity.clone();
        let fan_out = self
            .fan_out(
                "relationships for entity",
                move |connector| {
                    let entity = entity.clone();
                    async move { connector.get_relationships_for_entity(&entity).await }
                },
                &CancellationToken::new(),
            )
            .await?;
        Ok(self.assemble(fan_out, SequencingOrder::Guid, page_size))
    }

    /// Drop and disconnect the cached connector for `id`.
    pub async fn forget_member(&self, id: &MetadataCollectionId) {
        let cached = self.connectors.write().remove(id);
        if let Some(cached) = cached {
            if let Err(e) = cached.connector.disconnect().await {
                warn!(member = %id, error = %e, "disconnect failed");
            }
        }
    }

    /// Disconnect every cached connector.
    pub async fn disconnect_all(&self) {
        let drained: Vec<_> = self.connectors.write().drain().collect();
        for (id, cached) in drained {
            if let Err(e) = cached.connector.disconnect().await {
                warn!(member = %id, error = %e, "disconnect failed");
            }
        }
    }

    // ========================================================================
    // Fan-out
    // ========================================================================

    async fn check_page_size(&self, operation: &str, page_size: usize) -> Result<(), CoreError> {
        if page_size == 0 || page_size > self.config.max_page_size {
            let err = CoreError::PagingError {
                offset: 0,
                limit: i64::try_from(page_size).unwrap_or(i64::MAX),
            };
            debug!(operation, page_size, "federated call rejected");
            self.audit
                .log(&audit_codes::PAGING_REJECTED, &[&operation, &page_size, &self.config.max_page_size])
                .await;
            return Err(err);
        }
        Ok(())
    }

    /// Local repository first, then active members, then stale ones.
    async fn targets(&self, operation: &str, manifest: &mut Vec<ManifestEntry>) -> Vec<Target> {
        let mut targets = vec![Target {
            id: self.local.metadata_collection_id().clone(),
            connector: self.local.clone(),
            needs_start: false,
            remote: false,
        }];
        for member in self.registry.get_fanout_members() {
            match self.connector_for(&member) {
                Ok((connector, needs_start)) => targets.push(Target {
                    id: member.id().clone(),
                    connector,
                    needs_start,
                    remote: true,
                }),
                Err(e) => {
                    let connection = &member.registration.connection;
                    self.audit.log(&audit_codes::NO_CONNECTOR, &[member.id(), connection, &e]).await;
                    debug!(member = %member.id(), operation, "member skipped: no connector");
                    manifest.push(ManifestEntry {
                        metadata_collection_id: member.id().clone(),
                        outcome: MemberOutcome::Errored,
                        detail: e.to_string(),
                    });
                }
            }
        }
        targets
    }

    /// The cached connector for `member`, or a new one when none is cached
    /// or the member's descriptor has changed.
    fn connector_for(&self, member: &RemoteMember) -> Result<(Arc<dyn RepositoryConnector>, bool), CoreError> {
        let descriptor = &member.registration.connection;
        if let Some(cached) = self.connectors.read().get(member.id()) {
            if !cached.descriptor.materially_differs(descriptor) {
                return Ok((cached.connector.clone(), false));
            }
        }
        let connector = self.factories.create(descriptor)?;
        self.connectors.write().insert(
            member.id().clone(),
            CachedConnector {
                descriptor: descriptor.clone(),
                connector: connector.clone(),
            },
        );
        Ok((connector, true))
    }

    async fn fan_out<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
        cancel: &CancellationToken,
    ) -> Result<FanOut<T>, CoreError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn RepositoryConnector>) -> Fut,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let mut manifest = Vec::new();
        let targets = self.targets(operation, &mut manifest).await;
        let deadline = tokio::time::Instant::now() + self.config.member_timeout;

        let mut pending: Vec<bool> = vec![true; targets.len()];
        let mut tasks: JoinSet<(usize, Result<T, CoreError>)> = JoinSet::new();
        for (index, target) in targets.iter().enumerate() {
            let connector = target.connector.clone();
            let needs_start = target.needs_start;
            let request = call(connector.clone());
            tasks.spawn(async move {
                let result = async {
                    if needs_start {
                        connector.start().await?;
                    }
                    request.await
                }
                .await;
                (index, result)
            });
        }

        let mut responses = Vec::new();
        let mut responded = Vec::new();
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    let outstanding = pending.iter().filter(|p| **p).count();
                    info!(operation, outstanding, "federated call cancelled");
                    self.audit.log(&audit_codes::QUERY_CANCELLED, &[&operation, &outstanding]).await;
                    return Err(CoreError::Cancelled);
                }
                _ = &mut sleep => {
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    // A panicked task stays pending and is reported below.
                    let Ok((index, result)) = joined else {
                        continue;
                    };
                    pending[index] = false;
                    let target = &targets[index];
                    match result {
                        Ok(value) => {
                            responded.push(target.id.clone());
                            responses.push((target.id.clone(), value));
                        }
                        Err(e) => {
                            let outcome = match e {
                                CoreError::Cancelled => MemberOutcome::Cancelled,
                                _ => MemberOutcome::Errored,
                            };
                            manifest.push(self.member_failed(operation, target, outcome, e.to_string()).await);
                        }
                    }
                }
            }
        }

        for (index, target) in targets.iter().enumerate() {
            if !pending[index] {
                continue;
            }
            let (outcome, detail) = if tokio::time::Instant::now() >= deadline {
                (MemberOutcome::TimedOut, format!("no answer within {:?}", self.config.member_timeout))
            } else {
                (MemberOutcome::Errored, "member call aborted".to_string())
            };
            manifest.push(self.member_failed(operation, target, outcome, detail).await);
        }

        responded.sort();
        manifest.sort_by(|a, b| a.metadata_collection_id.cmp(&b.metadata_collection_id));
        debug!(operation, responded = responded.len(), missing = manifest.len(), "federated call finished");
        Ok(FanOut {
            responses,
            manifest,
            responded,
        })
    }

    async fn member_failed(
        &self,
        operation: &'static str,
        target: &Target,
        outcome: MemberOutcome,
        detail: String,
    ) -> ManifestEntry {
        if target.remote {
            warn!(member = %target.id, outcome = %outcome, operation, detail = %detail, "member did not answer");
            self.audit.log(&audit_codes::MEMBER_UNREACHABLE, &[&target.id, &outcome, &operation, &detail]).await;
            if outcome != MemberOutcome::Cancelled {
                self.registry.note_unreachable(&target.id).await;
            }
            self.connectors.write().remove(&target.id);
        } else {
            self.audit.log(&audit_codes::LOCAL_QUERY_FAILED, &[&outcome, &operation, &detail]).await;
        }
        ManifestEntry {
            metadata_collection_id: target.id.clone(),
            outcome,
            detail,
        }
    }

    /// Merge, drop excluded types, order and cut to `page_size`.
    fn assemble<T: Instance>(
        &self,
        fan_out: FanOut<Vec<T>>,
        order: SequencingOrder,
        page_size: usize,
    ) -> FederatedResult<T> {
        let merged = merge_instances(fan_out.responses);
        let total = merged.len();
        let mut instances: Vec<T> =
            merged.into_iter().filter(|i| !self.typedefs.is_excluded(&i.header().type_name)).collect();
        let excluded_count = total - instances.len();
        order.sort(&mut instances);
        let truncated = instances.len() > page_size;
        instances.truncate(page_size);
        FederatedResult {
            instances,
            manifest: fan_out.manifest,
            responded: fan_out.responded,
            excluded_count,
            truncated,
        }
    }
}
