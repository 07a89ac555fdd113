//! Storage Operator
//!
//! Converges `StorageCluster` resources by running the registered components
//! in priority order on every reconcile cycle.

mod backoff;
mod components;
mod config;
mod controller;
mod error;
mod probes;
mod reconciler;
mod status;
mod watcher;

use crate::config::OperatorConfig;
use crate::controller::Controller;
use crate::error::OperatorError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), OperatorError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Storage Operator");

    // kube's rustls transport needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    let config = OperatorConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Probes: {}", config.probe_bind_address);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Backoff: {:?}..{:?}", config.backoff_min, config.backoff_max);
    info!(
        "  CRD establish: timeout {:?}, poll {:?}",
        config.crd_establish_timeout, config.crd_poll_interval
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    let controller = Controller::new(config, &shutdown).await?;
    controller.run(shutdown).await
}
