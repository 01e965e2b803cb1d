//! adopt-controller: converges adopted nodes and keeps the registry in sync.
//!
//! This daemon:
//! - Loads adopted resources from a directory of JSON files
//! - Probes each node API and records facts, health and readiness
//! - Sets up link monitoring for nodes that request it
//! - Registers clusters and nodes with the remote registry

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adopt_controller::clients::{StaticLinkManager, TcpNodeAgent};
use adopt_controller::events::TracingEventSink;
use adopt_controller::{AdoptionReconciler, Controller, FileStore, ReconcilerConfig};

/// Adopted node controller
#[derive(Parser, Debug)]
#[command(name = "adopt-controller", version, about)]
struct Args {
    /// Directory holding one JSON file per adopted resource
    #[arg(long, default_value = "/var/lib/adopt-controller")]
    store_dir: String,

    /// Requeue interval in seconds for healthy and unreachable nodes
    #[arg(long, default_value = "30")]
    health_check_interval: u64,

    /// Resync interval in seconds (store listing, unaccepted resources)
    #[arg(long, default_value = "300")]
    resync_interval: u64,

    /// Deadline in seconds for each network step
    #[arg(long, default_value = "30")]
    step_timeout: u64,

    /// Registry request timeout in seconds
    #[arg(long, default_value = "30")]
    registry_timeout: u64,

    /// API key sent to the registry
    #[arg(long, env = "ADOPT_REGISTRY_API_KEY", hide_env_values = true)]
    registry_api_key: Option<String>,

    /// Node API connect timeout in seconds
    #[arg(long, default_value = "5")]
    connect_timeout: u64,

    /// Maximum number of concurrent reconciliations
    #[arg(long, default_value = "4")]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "adopt_controller=info,adopt_registry=info,events=info,hyper=warn,reqwest=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting adopt-controller");
    let config = ReconcilerConfig {
        health_check_interval: Duration::from_secs(args.health_check_interval),
        resync_interval: Duration::from_secs(args.resync_interval),
        step_timeout: Duration::from_secs(args.step_timeout),
        registry_timeout: Duration::from_secs(args.registry_timeout),
        registry_api_key: args.registry_api_key,
        ..Default::default()
    };
    validate(&config)?;

    let store = Arc::new(
        FileStore::open(&args.store_dir)
            .await
            .with_context(|| format!("failed to open store at {}", args.store_dir))?,
    );
    info!("Store directory: {}", store.dir().display());
    let resync_interval = config.resync_interval;
    let reconciler = Arc::new(AdoptionReconciler::new(
        store.clone(),
        Arc::new(TcpNodeAgent::new(Duration::from_secs(args.connect_timeout))),
        Arc::new(StaticLinkManager),
        Arc::new(TracingEventSink),
        config,
    ));
    let controller = Controller::new(store, reconciler, resync_interval).workers(args.workers);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    controller.run(cancel).await;
    info!("adopt-controller stopped");
    Ok(())
}

/// Reject timings that would stall every reconciliation.
fn validate(config: &ReconcilerConfig) -> Result<()> {
    if config.health_check_interval.is_zero() || config.resync_interval.is_zero() {
        anyhow::bail!("intervals must be greater than zero");
    }
    if config.step_timeout.is_zero() {
        anyhow::bail!("step timeout must be greater than zero");
    }
    Ok(())
}
