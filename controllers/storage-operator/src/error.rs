//! Operator-specific error types.
//!
//! Component failures never surface here; they are classified by the driver
//! and reported through the cluster status. These are the failures of the
//! operator's own plumbing.

use kube::Error as KubeError;
use platform_client::PlatformError;
use reconcile_core::{AdapterError, ConvergenceError, RegistryError};
use thiserror::Error;

/// Errors that can occur in the storage operator.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Platform client error (e.g. reading the server version)
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Duplicate or inconsistent component registration
    #[error("Component registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// A built-in resource definition is malformed
    #[error("Resource definition error: {0}")]
    Adapter(#[from] AdapterError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// StorageCluster without the metadata a cycle needs
    #[error("Invalid StorageCluster: {0}")]
    InvalidResource(String),

    /// Probe server failed
    #[error("Probe server error: {0}")]
    Probes(#[from] std::io::Error),
}

impl From<ConvergenceError> for OperatorError {
    fn from(err: ConvergenceError) -> Self {
        OperatorError::InvalidConfig(err.to_string())
    }
}
