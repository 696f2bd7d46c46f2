//! Prints every fleet CRD as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crds.yaml`

use crds::{ClusterTemplate, ManagedCluster, Management, MultiClusterService, ProviderTemplate, ServiceTemplate};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        Management::crd(),
        ClusterTemplate::crd(),
        ServiceTemplate::crd(),
        ProviderTemplate::crd(),
        ManagedCluster::crd(),
        MultiClusterService::crd(),
    ];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
