//! MultiClusterService CRD
//!
//! Services fanned out to every ManagedCluster matching a label selector.
//! The type is served so manifests can be applied; reconciliation is not
//! implemented yet.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::schema::preserve_unknown_fields;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "MultiClusterService",
    status = "MultiClusterServiceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterServiceSpec {
    /// Selects the managed clusters the services are deployed to
    #[serde(default)]
    pub cluster_selector: ClusterSelector,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceSpec>,

    /// Lower value wins when two objects deploy the same service (1..=2147483646)
    #[serde(default = "default_priority")]
    #[schemars(range(min = 1, max = 2_147_483_646))]
    pub priority: i32,

    /// Stop deploying services when a conflict with another object is found
    #[serde(default)]
    pub stop_on_conflict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Name of the ServiceTemplate
    pub template: String,

    /// Release name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub values: Option<serde_json::Value>,

    /// Keep the service defined but not deployed
    #[serde(default)]
    pub disable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

fn default_priority() -> i32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_omitted() {
        let spec: MultiClusterServiceSpec = serde_json::from_value(serde_json::json!({
            "services": [{"template": "kyverno", "name": "kyverno"}]
        }))
        .unwrap();
        assert_eq!(spec.priority, 100);
        assert!(!spec.stop_on_conflict);
        assert!(!spec.services[0].disable);
    }
}
