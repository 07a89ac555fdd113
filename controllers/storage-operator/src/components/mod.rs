//! Built-in components

pub mod portworx_crd;

pub use portworx_crd::{PORTWORX_CRD_COMPONENT_NAME, PortworxCrdComponent};

use crate::config::OperatorConfig;
use crate::error::OperatorError;
use crds::StorageCluster;
use reconcile_core::{ComponentRegistry, SetupPolicy};
use tokio_util::sync::CancellationToken;

/// Register every built-in component.
///
/// Waits inside components end early once `shutdown` is cancelled.
pub fn register_defaults(
    registry: &mut ComponentRegistry<StorageCluster>,
    config: &OperatorConfig,
    shutdown: &CancellationToken,
) -> Result<(), OperatorError> {
    let waiter = config.crd_waiter()?.with_cancellation(shutdown.clone());
    let crds = PortworxCrdComponent::new(waiter, SetupPolicy::TrustCached)?;
    registry.register(PORTWORX_CRD_COMPONENT_NAME, Box::new(crds))?;
    Ok(())
}
