//! Read-only accessors over a [`StorageCluster`].
//!
//! Distribution detection and enable flags are driven by annotations on the
//! cluster object. A value that does not parse as a boolean is treated as unset.

use crate::StorageCluster;

/// Annotation that disables the storage driver (and everything depending on it)
pub const ANNOTATION_DISABLE_STORAGE: &str = "operator.libopenstorage.org/disable-storage";
/// Annotation that forces the PVC controller on or off
pub const ANNOTATION_PVC_CONTROLLER: &str = "portworx.io/pvc-controller";
/// Marks a VMware PKS cluster
pub const ANNOTATION_IS_PKS: &str = "portworx.io/is-pks";
/// Marks a GKE cluster
pub const ANNOTATION_IS_GKE: &str = "portworx.io/is-gke";
/// Marks an AKS cluster
pub const ANNOTATION_IS_AKS: &str = "portworx.io/is-aks";
/// Marks an EKS cluster
pub const ANNOTATION_IS_EKS: &str = "portworx.io/is-eks";
/// Marks an OpenShift cluster
pub const ANNOTATION_IS_OPENSHIFT: &str = "portworx.io/is-openshift";

fn annotation_bool(cluster: &StorageCluster, key: &str) -> Option<bool> {
    cluster
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .and_then(|v| parse_bool(v))
}

/// Accepts 1/0, t/f and true/false, in any of the usual capitalizations.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Storage is enabled unless explicitly disabled.
pub fn is_portworx_enabled(cluster: &StorageCluster) -> bool {
    !annotation_bool(cluster, ANNOTATION_DISABLE_STORAGE).unwrap_or(false)
}

/// Running on VMware PKS
pub fn is_pks(cluster: &StorageCluster) -> bool {
    annotation_bool(cluster, ANNOTATION_IS_PKS).unwrap_or(false)
}

/// Running on Google Kubernetes Engine
pub fn is_gke(cluster: &StorageCluster) -> bool {
    annotation_bool(cluster, ANNOTATION_IS_GKE).unwrap_or(false)
}

/// Running on Azure Kubernetes Service
pub fn is_aks(cluster: &StorageCluster) -> bool {
    annotation_bool(cluster, ANNOTATION_IS_AKS).unwrap_or(false)
}

/// Running on Amazon EKS
pub fn is_eks(cluster: &StorageCluster) -> bool {
    annotation_bool(cluster, ANNOTATION_IS_EKS).unwrap_or(false)
}

/// Running on OpenShift
pub fn is_openshift(cluster: &StorageCluster) -> bool {
    annotation_bool(cluster, ANNOTATION_IS_OPENSHIFT).unwrap_or(false)
}

/// Whether the PVC controller should run.
///
/// An explicit annotation wins. Otherwise it runs on managed offerings, and on
/// OpenShift when the cluster is not deployed in `kube-system`, but never when
/// storage itself is disabled.
pub fn is_pvc_controller_enabled(cluster: &StorageCluster) -> bool {
    if let Some(explicit) = annotation_bool(cluster, ANNOTATION_PVC_CONTROLLER) {
        return explicit;
    }
    if !is_portworx_enabled(cluster) {
        return false;
    }
    let namespace = cluster.metadata.namespace.as_deref().unwrap_or("default");
    is_pks(cluster)
        || is_eks(cluster)
        || is_gke(cluster)
        || is_aks(cluster)
        || (is_openshift(cluster) && namespace != "kube-system")
}
