//! Object references shared by the fleet CRDs
//!
//! Mirrors the Flux `CrossNamespaceSourceReference` shape so a template's
//! resolved chart can be handed to a HelmRelease as-is.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a chart source object, possibly in another namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartReference {
    /// API version of the referent (e.g., "source.toolkit.fluxcd.io/v1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the referent. Only "HelmChart" is accepted for templates.
    pub kind: String,

    pub name: String,

    /// Namespace of the referent, defaults to the referencing object's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ChartReference {
    /// Reference to a HelmChart by name and namespace
    pub fn helm_chart(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: None,
            kind: "HelmChart".to_string(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Namespace of the referent, falling back to `default_namespace`
    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_namespace)
    }
}
