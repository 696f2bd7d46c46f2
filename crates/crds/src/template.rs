//! Template CRDs
//!
//! `ClusterTemplate`, `ServiceTemplate` and `ProviderTemplate` share one shape:
//! a pointer at a Helm chart plus the validation outcome recorded by the
//! controller. The [`Template`] trait lets the validator treat all three alike.

use std::collections::BTreeMap;

use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CHART_ANNOTATION_BOOTSTRAP_PROVIDERS, CHART_ANNOTATION_CONTROL_PLANE_PROVIDERS,
    CHART_ANNOTATION_INFRA_PROVIDERS, MANAGED_LABEL_KEY, MANAGED_LABEL_VALUE,
};
use crate::references::ChartReference;
use crate::schema::preserve_unknown_fields;

/// Where the template's chart comes from
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HelmSpec {
    /// Chart name in the default template repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,

    /// Existing HelmChart to use instead of generating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_ref: Option<ChartReference>,
}

/// CAPI providers a template brings or requires
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Providers {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub infrastructure: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bootstrap: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_plane: Vec<String>,
}

impl Providers {
    pub fn is_empty(&self) -> bool {
        self.infrastructure.is_empty() && self.bootstrap.is_empty() && self.control_plane.is_empty()
    }

    /// Append another set of providers. Duplicates are kept.
    pub fn extend(&mut self, other: &Providers) {
        self.infrastructure.extend(other.infrastructure.iter().cloned());
        self.bootstrap.extend(other.bootstrap.iter().cloned());
        self.control_plane.extend(other.control_plane.iter().cloned());
    }

    /// Read provider lists from comma-separated chart annotations
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let split = |key: &str| -> Vec<String> {
            annotations
                .get(key)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            infrastructure: split(CHART_ANNOTATION_INFRA_PROVIDERS),
            bootstrap: split(CHART_ANNOTATION_BOOTSTRAP_PROVIDERS),
            control_plane: split(CHART_ANNOTATION_CONTROL_PLANE_PROVIDERS),
        }
    }
}

/// Recognized template types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Cluster,
    Service,
    Provider,
}

impl TemplateType {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateType::Cluster => "cluster",
            TemplateType::Service => "service",
            TemplateType::Provider => "provider",
        }
    }

    /// Parse a type name, returning the fixed rejection message otherwise
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "cluster" => Ok(TemplateType::Cluster),
            "service" => Ok(TemplateType::Service),
            "provider" => Ok(TemplateType::Provider),
            other => Err(format!(
                "the template type \"{other}\" is not supported: should be one of cluster, service, provider"
            )),
        }
    }
}

/// Spec fields common to every template kind
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpecCommon {
    pub helm: HelmSpec,

    /// Template type; when unset the chart's type annotation is used
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<TemplateType>,

    /// Overrides the provider annotations of the chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Providers>,
}

/// Validation outcome recorded by the template controller
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStatus {
    /// True once the chart was downloaded, parsed and validated
    #[serde(default)]
    pub valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,

    /// Resolved HelmChart the template points at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_ref: Option<ChartReference>,

    /// Default chart values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub providers: Providers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "ClusterTemplate",
    namespaced,
    status = "TemplateStatus",
    printcolumn = r#"{"name":"Valid","type":"boolean","jsonPath":".status.valid"}"#,
    printcolumn = r#"{"name":"Description","type":"string","jsonPath":".status.description"}"#
)]
pub struct ClusterTemplateSpec {
    #[serde(flatten)]
    pub template: TemplateSpecCommon,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "ServiceTemplate",
    namespaced,
    status = "TemplateStatus",
    printcolumn = r#"{"name":"Valid","type":"boolean","jsonPath":".status.valid"}"#
)]
pub struct ServiceTemplateSpec {
    #[serde(flatten)]
    pub template: TemplateSpecCommon,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.microscaler.io",
    version = "v1alpha1",
    kind = "ProviderTemplate",
    namespaced,
    status = "TemplateStatus",
    printcolumn = r#"{"name":"Valid","type":"boolean","jsonPath":".status.valid"}"#
)]
pub struct ProviderTemplateSpec {
    #[serde(flatten)]
    pub template: TemplateSpecCommon,
}

/// Which of the three template kinds an object is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    Cluster,
    Service,
    Provider,
}

impl TemplateKind {
    pub fn kind_name(self) -> &'static str {
        match self {
            TemplateKind::Cluster => "ClusterTemplate",
            TemplateKind::Service => "ServiceTemplate",
            TemplateKind::Provider => "ProviderTemplate",
        }
    }
}

/// Capability shared by the three template kinds
pub trait Template: Resource<DynamicType = ()> + Clone + Send + Sync {
    const KIND: TemplateKind;

    fn spec(&self) -> &TemplateSpecCommon;
    fn status(&self) -> Option<&TemplateStatus>;

    /// Whether the template itself was created by the control plane
    fn is_managed(&self) -> bool {
        self.meta()
            .labels
            .as_ref()
            .and_then(|l| l.get(MANAGED_LABEL_KEY))
            .is_some_and(|v| v == MANAGED_LABEL_VALUE)
    }

    fn is_valid(&self) -> bool {
        self.status().is_some_and(|s| s.valid)
    }
}

macro_rules! impl_template {
    ($ty:ty, $kind:expr) => {
        impl Template for $ty {
            const KIND: TemplateKind = $kind;

            fn spec(&self) -> &TemplateSpecCommon {
                &self.spec.template
            }

            fn status(&self) -> Option<&TemplateStatus> {
                self.status.as_ref()
            }
        }
    };
}

impl_template!(ClusterTemplate, TemplateKind::Cluster);
impl_template!(ServiceTemplate, TemplateKind::Service);
impl_template!(ProviderTemplate, TemplateKind::Provider);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_from_annotations_split_and_trim() {
        let mut annotations = BTreeMap::new();
        annotations.insert(CHART_ANNOTATION_INFRA_PROVIDERS.to_string(), "aws, azure,".to_string());
        annotations.insert(CHART_ANNOTATION_BOOTSTRAP_PROVIDERS.to_string(), "k0s".to_string());

        let providers = Providers::from_annotations(&annotations);
        assert_eq!(providers.infrastructure, vec!["aws", "azure"]);
        assert_eq!(providers.bootstrap, vec!["k0s"]);
        assert!(providers.control_plane.is_empty());
    }

    #[test]
    fn providers_extend_keeps_duplicates() {
        let mut all = Providers {
            infrastructure: vec!["aws".into()],
            ..Default::default()
        };
        all.extend(&Providers {
            infrastructure: vec!["aws".into()],
            ..Default::default()
        });
        assert_eq!(all.infrastructure, vec!["aws", "aws"]);
    }

    #[test]
    fn template_type_rejects_unknown_values() {
        assert_eq!(TemplateType::parse("service"), Ok(TemplateType::Service));
        let err = TemplateType::parse("deployment").unwrap_err();
        assert!(err.contains("cluster, service, provider"));
    }

    #[test]
    fn spec_deserializes_flattened_fields() {
        let tpl: ClusterTemplate = serde_json::from_value(serde_json::json!({
            "apiVersion": "fleet.microscaler.io/v1alpha1",
            "kind": "ClusterTemplate",
            "metadata": {"name": "aws-standalone", "namespace": "fleet-system"},
            "spec": {"helm": {"chartName": "aws-standalone", "chartVersion": "0.1.0"}, "type": "cluster"}
        }))
        .unwrap();
        assert_eq!(Template::spec(&tpl).helm.chart_name.as_deref(), Some("aws-standalone"));
        assert_eq!(Template::spec(&tpl).template_type, Some(TemplateType::Cluster));
        assert!(!tpl.is_valid());
    }
}
