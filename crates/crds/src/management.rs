//! Management CRD
//!
//! The cluster-wide installation intent: which core components and which
//! CAPI providers the control plane installs. Exactly one instance, named
//! [`MANAGEMENT_NAME`], is acted on.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CORE_CAPI_TEMPLATE, DEFAULT_CORE_PLATFORM_TEMPLATE, MANAGEMENT_NAME};
use crate::schema::preserve_unknown_fields;
use crate::template::Providers;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "Management",
    status = "ManagementStatus",
    shortname = "fleetmgmt"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagementSpec {
    /// Core components. Filled with defaults on first reconcile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<Core>,

    /// CAPI providers to install after the core
    #[serde(default)]
    pub providers: Vec<Component>,
}

/// The two core components, installed before any provider
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Core {
    /// The fleet platform itself
    pub platform: Component,
    /// Cluster API core
    pub capi: Component,
}

/// A single installable component: a ProviderTemplate plus chart values
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Name of the ProviderTemplate in the system namespace
    pub template: String,

    /// Helm values for the component's release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,
}

impl Component {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            config: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagementStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Providers contributed by every successfully installed component
    #[serde(default)]
    pub available_providers: Providers,

    /// Per-component installation state, keyed by template name
    #[serde(default)]
    pub components: BTreeMap<String, ComponentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManagementSpec {
    /// Fill the core components when unset. Returns true when the spec changed.
    pub fn set_defaults(&mut self) -> bool {
        if self.core.is_some() {
            return false;
        }
        self.core = Some(Core {
            platform: Component::new(DEFAULT_CORE_PLATFORM_TEMPLATE),
            capi: Component::new(DEFAULT_CORE_CAPI_TEMPLATE),
        });
        true
    }
}

impl Management {
    /// Singleton with the default core and provider set
    pub fn with_defaults() -> Self {
        let mut spec = ManagementSpec {
            core: None,
            providers: default_providers(),
        };
        spec.set_defaults();
        Management::new(MANAGEMENT_NAME, spec)
    }
}

/// Providers installed when the singleton is created at startup
pub fn default_providers() -> Vec<Component> {
    vec![
        Component::new("k0smotron"),
        Component {
            template: "cluster-api-provider-aws".to_string(),
            config: Some(serde_json::json!({
                "configSecret": {"name": "aws-variables"}
            })),
        },
        Component::new("cluster-api-provider-azure"),
        Component::new("projectsveltos"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_defaults_fills_missing_core_once() {
        let mut spec = ManagementSpec::default();
        assert!(spec.set_defaults());
        let core = spec.core.clone().unwrap();
        assert_eq!(core.platform.template, DEFAULT_CORE_PLATFORM_TEMPLATE);
        assert_eq!(core.capi.template, DEFAULT_CORE_CAPI_TEMPLATE);
        assert!(!spec.set_defaults());
    }

    #[test]
    fn with_defaults_is_the_named_singleton() {
        let mgmt = Management::with_defaults();
        assert_eq!(mgmt.metadata.name.as_deref(), Some(MANAGEMENT_NAME));
        assert_eq!(mgmt.spec.providers.len(), 4);
        assert!(mgmt.spec.core.is_some());
    }
}
