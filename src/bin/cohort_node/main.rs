//! cohort-node: one member of a metadata repository cohort.
//!
//! Runs a node with an in-memory repository on an in-process event bus until
//! SIGINT or SIGTERM. Configuration is loaded from environment variables,
//! TOML files, or CLI arguments.
//!
//! # Usage
//!
//! ```bash
//! # Start node with TOML config
//! cohort-node --config /etc/cohort/node.toml
//!
//! # Start node with CLI args
//! cohort-node --server-name catalog-east --archive core.json
//!
//! # Environment variables
//! export COHORT_SERVER_NAME=catalog-east
//! cohort-node
//! ```

mod args;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use cohort::CohortNode;
use cohort::load_config;
use cohort_core::InMemoryRepository;
use cohort_events::EventBus;
use cohort_events::InMemoryEventBus;
use cohort_federation::ConnectorFactoryTable;
use tokio::signal;
use tracing::error;
use tracing::info;

use crate::args::Args;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref(), args.overrides()).await?;
    let local_id = config.resolve_metadata_collection_id().await?;
    config.metadata_collection_id = Some(local_id.clone());

    info!(
        server = %config.server_name,
        metadata_collection_id = %local_id,
        data_dir = %config.data_dir().display(),
        "starting cohort node v{}",
        env!("CARGO_PKG_VERSION")
    );

    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let local = Arc::new(InMemoryRepository::new(local_id));
    let node = CohortNode::start(config, bus, local, ConnectorFactoryTable::new()).await?;

    shutdown_signal().await;

    node.shutdown().await;
    Ok(())
}

/// Initialize tracing subscriber with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => error!("failed to install Ctrl+C handler: {}", err),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => error!("failed to install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
