//! StorageCluster watcher.
//!
//! Drives [`Reconciler`] from a `kube_runtime::Controller`, which handles
//! reconnection, queueing and requeue timers. Only spec or annotation changes
//! trigger a cycle; the operator's own status patches do not.

use crate::error::OperatorError;
use crate::reconciler::{Reconciler, cluster_key};
use crds::StorageCluster;
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, WatchStreamExt, reflector, watcher};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Fingerprint of the inputs a cycle reads: `metadata.generation` plus the
/// annotations, which carry enable flags but do not bump the generation.
pub fn cycle_inputs(cluster: &StorageCluster) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    cluster.metadata.generation.hash(&mut hasher);
    cluster.metadata.annotations.hash(&mut hasher);
    Some(hasher.finish())
}

/// What each reconcile call receives
pub struct WatchContext {
    pub reconciler: Reconciler,
    pub client: Client,
}

async fn reconcile(cluster: Arc<StorageCluster>, ctx: Arc<WatchContext>) -> Result<Action, OperatorError> {
    let namespace = cluster
        .namespace()
        .ok_or_else(|| OperatorError::InvalidResource(format!("StorageCluster {} has no namespace", cluster.name_any())))?;
    let api: Api<StorageCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let key = cluster_key(&cluster);
    debug!(cluster = %key, "Reconciling StorageCluster");
    ctx.reconciler
        .reconcile_cluster(&api, &cluster)
        .instrument(info_span!("storage_cluster", cluster = %key))
        .await
}

// Plumbing errors (version lookup, status patch); component failures requeue
// through the reconciler's own backoff.
fn error_policy(cluster: Arc<StorageCluster>, err: &OperatorError, _ctx: Arc<WatchContext>) -> Action {
    error!(cluster = %cluster_key(&cluster), "Reconciliation error: {}", err);
    Action::requeue(ERROR_REQUEUE)
}

/// Watch StorageClusters until `shutdown` fires
pub async fn watch_storage_clusters(
    api: Api<StorageCluster>,
    ctx: Arc<WatchContext>,
    shutdown: CancellationToken,
) -> Result<(), OperatorError> {
    info!("Starting StorageCluster watcher");

    // One cycle at a time: the component registry is shared across clusters.
    let controller_config = ControllerConfig::default().debounce(Duration::from_secs(2)).concurrency(1);

    let (reader, writer) = reflector::store();
    let clusters = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(cycle_inputs);

    Controller::for_stream(clusters, reader)
        .with_config(controller_config)
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => debug!(cluster = %object.name, "Reconciled"),
                Err(e) => error!("StorageCluster controller error: {}", e),
            }
        })
        .await;

    info!("StorageCluster watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{ClusterPhase, StorageClusterSpec, StorageClusterStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn cluster(generation: i64) -> StorageCluster {
        StorageCluster {
            metadata: ObjectMeta {
                name: Some("px-cluster".to_string()),
                namespace: Some("kube-system".to_string()),
                generation: Some(generation),
                resource_version: Some("100".to_string()),
                ..Default::default()
            },
            spec: StorageClusterSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_status_patch_does_not_change_cycle_inputs() {
        let before = cluster(3);
        let mut after = before.clone();
        after.metadata.resource_version = Some("101".to_string());
        after.status = Some(StorageClusterStatus {
            phase: ClusterPhase::Degraded,
            last_reconciled: Some(chrono::Utc::now()),
            ..Default::default()
        });
        assert_eq!(cycle_inputs(&before), cycle_inputs(&after));
    }

    #[test]
    fn test_spec_and_annotation_changes_are_seen() {
        let before = cluster(3);
        assert_ne!(cycle_inputs(&before), cycle_inputs(&cluster(4)));

        let mut annotated = before.clone();
        annotated.metadata.annotations = Some(
            [(crds::predicates::ANNOTATION_DISABLE_STORAGE.to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        );
        assert_ne!(cycle_inputs(&before), cycle_inputs(&annotated));
    }
}
