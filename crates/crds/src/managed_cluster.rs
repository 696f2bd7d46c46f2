//! ManagedCluster CRD
//!
//! A workload cluster instantiated from a ClusterTemplate, optionally with
//! add-on services installed on it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::{
    set_condition, Condition, CONDITION_UNKNOWN, HELM_CHART_READY_CONDITION,
    HELM_RELEASE_READY_CONDITION, PROGRESSING_REASON, READY_CONDITION, TEMPLATE_READY_CONDITION,
};
use crate::schema::preserve_unknown_fields;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "ManagedCluster",
    namespaced,
    status = "ManagedClusterStatus",
    shortname = "mcluster",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}"#,
    printcolumn = r#"{"name":"DryRun","type":"boolean","jsonPath":".spec.dryRun"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Name of the ClusterTemplate in the system namespace
    pub template: String,

    /// Helm values for the cluster chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,

    /// Validate the template and values without creating anything
    #[serde(default)]
    pub dry_run: bool,

    /// Add-on services installed on the cluster once it is ready
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceRef>,
}

/// An add-on service backed by a ServiceTemplate
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    /// Name of the ServiceTemplate in the system namespace
    pub template: String,

    pub release_name: String,

    /// Defaults to the release name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub values: Option<serde_json::Value>,

    /// Set to false to keep the service out of the add-on profile
    #[serde(default = "default_true")]
    pub install: bool,

    #[serde(default = "default_true")]
    pub create_namespace: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_config: Option<RegistryConfig>,
}

/// TLS settings of the registry serving a service chart
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default, rename = "plainHTTP")]
    pub plain_http: bool,

    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedCluster {
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default()
    }
}

impl ManagedClusterStatus {
    /// Seed every tracked condition as Unknown/Progressing
    pub fn init_conditions(&mut self, dry_run: bool) {
        set_condition(
            &mut self.conditions,
            Condition::new(TEMPLATE_READY_CONDITION, CONDITION_UNKNOWN, PROGRESSING_REASON, "Template is not yet ready"),
        );
        set_condition(
            &mut self.conditions,
            Condition::new(HELM_CHART_READY_CONDITION, CONDITION_UNKNOWN, PROGRESSING_REASON, "Helm Chart is not yet ready"),
        );
        if !dry_run {
            set_condition(
                &mut self.conditions,
                Condition::new(
                    HELM_RELEASE_READY_CONDITION,
                    CONDITION_UNKNOWN,
                    PROGRESSING_REASON,
                    "HelmRelease is not yet ready",
                ),
            );
        }
        set_condition(
            &mut self.conditions,
            Condition::new(READY_CONDITION, CONDITION_UNKNOWN, PROGRESSING_REASON, "ManagedCluster is not yet ready"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::find_condition;

    #[test]
    fn init_conditions_skips_release_condition_on_dry_run() {
        let mut status = ManagedClusterStatus::default();
        status.init_conditions(true);
        assert_eq!(status.conditions.len(), 3);
        assert!(find_condition(&status.conditions, HELM_RELEASE_READY_CONDITION).is_none());

        let mut status = ManagedClusterStatus::default();
        status.init_conditions(false);
        assert_eq!(status.conditions.len(), 4);
    }

    #[test]
    fn service_ref_defaults_to_install() {
        let svc: ServiceRef = serde_json::from_value(serde_json::json!({
            "template": "ingress-nginx",
            "releaseName": "ingress"
        }))
        .unwrap();
        assert!(svc.install);
        assert!(svc.create_namespace);
        assert!(svc.release_namespace.is_none());
    }
}
