//! Operator wiring.
//!
//! Builds the platform client, event sink and component registry, then runs
//! the StorageCluster watcher next to the probe server until shutdown.

use crate::backoff::BackoffTracker;
use crate::components::register_defaults;
use crate::config::OperatorConfig;
use crate::error::OperatorError;
use crate::probes::{self, Readiness};
use crate::reconciler::Reconciler;
use crate::watcher::{WatchContext, watch_storage_clusters};
use crds::StorageCluster;
use kube::{Api, Client};
use platform_client::{KubeEventSink, KubePlatformClient};
use reconcile_core::ComponentRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Name events are reported under
pub const CONTROLLER_NAME: &str = "storage-operator";

/// The running operator
pub struct Controller {
    config: OperatorConfig,
    client: Client,
    context: Arc<WatchContext>,
    readiness: Readiness,
}

impl Controller {
    /// `shutdown` also cancels in-flight waits inside components
    pub async fn new(config: OperatorConfig, shutdown: &CancellationToken) -> Result<Self, OperatorError> {
        info!("Initializing storage operator");
        let client = Client::try_default().await?;

        let mut registry = ComponentRegistry::new();
        register_defaults(&mut registry, &config, shutdown)?;
        info!(components = ?registry.names(), "Registered components");

        let readiness = Readiness::default();
        let reconciler = Reconciler::new(
            Arc::new(KubePlatformClient::new(client.clone())),
            Arc::new(KubeEventSink::new(client.clone(), CONTROLLER_NAME)),
            registry,
            BackoffTracker::new(config.backoff_min, config.backoff_max),
            readiness.clone(),
            config.resync_interval,
        );

        Ok(Self {
            context: Arc::new(WatchContext {
                reconciler,
                client: client.clone(),
            }),
            client,
            config,
            readiness,
        })
    }

    /// Run until `shutdown` fires or the watcher exits
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), OperatorError> {
        let api: Api<StorageCluster> = match self.config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let probe_server = tokio::spawn(probes::serve(
            self.config.probe_bind_address,
            self.readiness.clone(),
            shutdown.clone(),
        ));

        let result = watch_storage_clusters(api, self.context, shutdown.clone()).await;

        // Stop the probe server with the watcher, whichever ended first.
        shutdown.cancel();
        match probe_server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Probe server failed: {}", e);
                return Err(e.into());
            }
            Err(e) => error!("Probe server task panicked: {}", e),
        }
        result
    }
}
