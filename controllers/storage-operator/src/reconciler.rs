//! StorageCluster reconciliation.
//!
//! One reconcile call runs one driver cycle over the shared component
//! registry, then publishes the outcome as status and events. Blocked cycles
//! requeue with Fibonacci backoff; every other outcome resyncs on the
//! configured interval.

use crate::backoff::BackoffTracker;
use crate::error::OperatorError;
use crate::probes::Readiness;
use crate::status::{patch_status, record_cycle_events, status_from_report};
use chrono::Utc;
use crds::StorageCluster;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::Action;
use platform_client::{EventSink, PlatformClient};
use reconcile_core::{ComponentContext, ComponentRegistry, CycleReport, ReconciliationDriver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shared state handed to every reconcile call
pub struct Reconciler {
    platform: Arc<dyn PlatformClient>,
    events: Arc<dyn EventSink>,
    // One registry serves every cluster; components hold process-wide setup
    // state, so cycles never overlap.
    registry: Mutex<ComponentRegistry<StorageCluster>>,
    driver: ReconciliationDriver,
    backoff: BackoffTracker,
    readiness: Readiness,
    resync_interval: Duration,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        events: Arc<dyn EventSink>,
        registry: ComponentRegistry<StorageCluster>,
        backoff: BackoffTracker,
        readiness: Readiness,
        resync_interval: Duration,
    ) -> Self {
        Self {
            platform,
            events,
            registry: Mutex::new(registry),
            driver: ReconciliationDriver::new(),
            backoff,
            readiness,
            resync_interval,
        }
    }

    /// Run one cycle for `cluster` and publish the result through `api`
    pub async fn reconcile_cluster(
        &self,
        api: &Api<StorageCluster>,
        cluster: &StorageCluster,
    ) -> Result<Action, OperatorError> {
        let name = cluster
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| OperatorError::InvalidResource("StorageCluster has no name".to_string()))?;
        let key = cluster_key(cluster);

        let (report, target) = self.run_cycle(cluster).await?;

        let status = status_from_report(&report, Utc::now());
        patch_status(api, name, &status).await?;

        let previous = cluster.status.as_ref().map(|s| s.phase);
        record_cycle_events(self.events.as_ref(), &target, &report, previous);

        Ok(self.next_action(&key, &report))
    }

    /// Run a driver cycle, re-reading the platform version first
    pub async fn run_cycle(&self, cluster: &StorageCluster) -> Result<(CycleReport, ObjectReference), OperatorError> {
        let version = self.platform.server_version().await?;
        let target = cluster.object_ref(&());
        let ctx = ComponentContext::new(Arc::clone(&self.platform), version, Arc::clone(&self.events), target.clone());

        debug!(cluster = %cluster_key(cluster), platform_version = %version, "Starting reconcile cycle");
        let report = {
            let mut registry = self.registry.lock().await;
            self.driver.run_cycle(&mut registry, cluster, &ctx).await
        };
        self.readiness.mark_ready();
        Ok((report, target))
    }

    /// Requeue policy for a finished cycle
    pub fn next_action(&self, key: &str, report: &CycleReport) -> Action {
        match report.blocking() {
            Some(failure) => {
                let delay = self.backoff.failure(key);
                warn!(
                    cluster = key,
                    cycle_id = %report.cycle_id,
                    "Cycle blocked by {}, retrying in {:?}",
                    failure.summary(),
                    delay
                );
                Action::requeue(delay)
            }
            None => {
                self.backoff.success(key);
                info!(
                    cluster = key,
                    cycle_id = %report.cycle_id,
                    outcome = report.outcome.as_str(),
                    "Next resync in {:?}",
                    self.resync_interval
                );
                Action::requeue(self.resync_interval)
            }
        }
    }
}

/// `namespace/name` of a cluster
pub fn cluster_key(cluster: &StorageCluster) -> String {
    format!("{}/{}", cluster.namespace().unwrap_or_default(), cluster.name_any())
}
