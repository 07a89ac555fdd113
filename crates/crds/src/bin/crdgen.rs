//! Prints the StorageCluster CRD as YAML, for `kubectl apply -f -`.

use crds::StorageCluster;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&StorageCluster::crd())?;
    print!("{yaml}");
    Ok(())
}
