//! Fleet CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the fleet control plane:
//! the Management installation intent, the three template kinds,
//! ManagedCluster and MultiClusterService.

pub mod conditions;
pub mod constants;
pub mod managed_cluster;
pub mod management;
pub mod multicluster_service;
pub mod references;
pub mod schema;
pub mod template;

pub use conditions::*;
pub use managed_cluster::*;
pub use management::*;
pub use multicluster_service::*;
pub use references::*;
pub use template::*;
