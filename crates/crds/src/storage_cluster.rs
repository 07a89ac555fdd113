//! StorageCluster Custom Resource Definition
//!
//! The declarative document the operator converges the storage platform toward.
//! The reconciliation core treats it as opaque; only the accessors in
//! [`crate::predicates`] and individual components read specific fields.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// StorageClusterSpec defines the desired state of the storage platform
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "core.libopenstorage.org",
    version = "v1",
    kind = "StorageCluster",
    shortname = "stc",
    namespaced,
    status = "StorageClusterStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
/// Desired state of a storage cluster
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    /// Storage driver image (e.g. "portworx/oci-monitor:3.1.0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Stork scheduler extension settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stork: Option<ToggleSpec>,

    /// CSI sidecar settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi: Option<ToggleSpec>,

    /// Monitoring stack settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,

    /// Autopilot (cluster autoscaling hooks) settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopilot: Option<ToggleSpec>,

    /// Free-form feature gates, keyed by gate name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_gates: BTreeMap<String, String>,

    /// Node placement rules, passed through to workloads untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub placement: Option<serde_json::Value>,
}

/// Generic enable switch used by several subsystems
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSpec {
    /// Whether the subsystem should be deployed
    #[serde(default)]
    pub enabled: bool,

    /// Optional image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Metrics export settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    /// Export metrics from the storage nodes
    #[serde(default)]
    pub export_metrics: bool,

    /// Deploy the bundled Prometheus stack
    #[serde(default)]
    pub prometheus: Option<ToggleSpec>,
}

/// StorageClusterStatus defines the observed state reported after each cycle
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    /// Aggregate phase of the last reconcile cycle
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Machine-readable reason for the phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable detail (the blocking error when Blocked)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Advisory failures from the last cycle, one line per component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Cluster phase as seen by the status-reporting layer.
///
/// Serializes as PascalCase ("Online", "Degraded", ...) to match the printer column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterPhase {
    /// No cycle has completed yet
    #[default]
    Initializing,
    /// Every component converged
    Online,
    /// Converging with advisory issues
    Degraded,
    /// Blocked on a critical component failure
    Blocked,
}

impl ClusterPhase {
    /// The string stored in `.status.phase`
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterPhase::Initializing => "Initializing",
            ClusterPhase::Online => "Online",
            ClusterPhase::Degraded => "Degraded",
            ClusterPhase::Blocked => "Blocked",
        }
    }
}

fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
