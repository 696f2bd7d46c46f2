//! Models for the objects the fleet controllers drive but do not define
//!
//! Flux source/helm objects, the Sveltos add-on profile and the minimal view of
//! Cluster API infrastructure objects used during teardown.

use std::collections::BTreeMap;

use crds::constants::{MANAGED_LABEL_KEY, MANAGED_LABEL_VALUE};
use crds::{ChartReference, Condition, CONDITION_TRUE, READY_CONDITION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::CustomResource;
use kube::api::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Poll interval of generated chart sources and releases
pub const DEFAULT_RECONCILE_INTERVAL: &str = "10m";

/// Outcome of a create-or-update call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Unchanged,
    Created,
    Updated,
}

/// Object kinds the platform installer creates and tears down by label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedKind {
    HelmRelease,
    HelmChart,
    HelmRepository,
}

impl ManagedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ManagedKind::HelmRelease => "HelmRelease",
            ManagedKind::HelmChart => "HelmChart",
            ManagedKind::HelmRepository => "HelmRepository",
        }
    }
}

/// Label set applied to everything the control plane generates
pub fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_LABEL_KEY.to_string(), MANAGED_LABEL_VALUE.to_string())])
}

/// Equality-based selector string, e.g. `a=b,c=d`
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn labels_match(labels: Option<&BTreeMap<String, String>>, selector: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

// ---------------------------------------------------------------------------
// Flux source-controller
// ---------------------------------------------------------------------------

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "HelmRepository",
    namespaced,
    status = "HelmRepositoryStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositorySpec {
    pub url: String,

    /// "oci" for OCI registries, "default" otherwise
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub repository_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositoryStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "HelmChart",
    namespaced,
    status = "HelmChartStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartSpec {
    pub chart: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub source_ref: SourceReference,

    pub interval: String,
}

/// Local reference to the repository serving a chart
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

/// Downloadable, content-addressed chart archive produced by source-controller
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub url: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub revision: String,

    /// "sha256:<hex>"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// Why a chart's artifact cannot be used yet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ArtifactNotReady {
    /// The chart reported a failure that belongs in the template status.
    /// False means the chart simply was not reconciled yet.
    pub report_status: bool,
    pub message: String,
}

/// Check whether a HelmChart has produced a usable artifact
pub fn artifact_ready(chart: &HelmChart) -> Result<&Artifact, ArtifactNotReady> {
    let not_reconciled = || ArtifactNotReady {
        report_status: false,
        message: "HelmChart was not reconciled yet, retrying".to_string(),
    };
    let status = chart.status.as_ref().ok_or_else(not_reconciled)?;
    if let Some(ready) = status.conditions.iter().find(|c| c.type_ == READY_CONDITION) {
        if ready.observed_generation.is_some() && ready.observed_generation != chart.metadata.generation {
            return Err(not_reconciled());
        }
        if !ready.is_true() {
            return Err(ArtifactNotReady {
                report_status: true,
                message: ready.message.clone(),
            });
        }
    }
    status.artifact.as_ref().ok_or_else(not_reconciled)
}

impl HelmChart {
    /// Generated chart pointing at a named HelmRepository
    pub fn generated(
        name: &str,
        namespace: &str,
        chart: &str,
        version: Option<&str>,
        repository: &str,
        owner: Option<OwnerReference>,
    ) -> Self {
        let mut helm_chart = HelmChart::new(
            name,
            HelmChartSpec {
                chart: chart.to_string(),
                version: version.map(String::from),
                source_ref: SourceReference {
                    kind: "HelmRepository".to_string(),
                    name: repository.to_string(),
                },
                interval: DEFAULT_RECONCILE_INTERVAL.to_string(),
            },
        );
        helm_chart.metadata.namespace = Some(namespace.to_string());
        helm_chart.metadata.labels = Some(managed_labels());
        helm_chart.metadata.owner_references = owner.map(|o| vec![o]);
        helm_chart
    }
}

// ---------------------------------------------------------------------------
// Flux helm-controller
// ---------------------------------------------------------------------------

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "helm.toolkit.fluxcd.io",
    version = "v2",
    kind = "HelmRelease",
    namespaced,
    status = "HelmReleaseStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_ref: Option<ChartReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crds::schema::preserve_unknown_fields")]
    pub values: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencyReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallSpec>,

    #[serde(default)]
    pub suspend: bool,

    pub interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReference {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstallSpec {
    #[serde(default)]
    pub create_namespace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Desired state of a release, as computed by a reconciler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseOptions {
    pub values: Option<serde_json::Value>,
    pub chart_ref: Option<ChartReference>,
    /// Names of releases (same namespace) that must be ready first
    pub depends_on: Vec<String>,
    pub target_namespace: Option<String>,
    pub create_namespace: bool,
    pub owner_reference: Option<OwnerReference>,
}

impl HelmRelease {
    /// Build the release an operator asked for
    pub fn desired(name: &str, namespace: &str, opts: &ReleaseOptions) -> Self {
        let spec = HelmReleaseSpec {
            chart_ref: opts.chart_ref.clone(),
            values: opts.values.clone(),
            depends_on: opts
                .depends_on
                .iter()
                .map(|d| DependencyReference {
                    name: d.clone(),
                    namespace: None,
                })
                .collect(),
            target_namespace: opts.target_namespace.clone(),
            install: opts.create_namespace.then_some(InstallSpec { create_namespace: true }),
            suspend: false,
            interval: DEFAULT_RECONCILE_INTERVAL.to_string(),
        };
        HelmRelease {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                owner_references: opts.owner_reference.clone().map(|o| vec![o]),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    /// Merge a desired release into this one. Returns true when anything changed.
    ///
    /// Status, suspension and foreign labels are preserved.
    pub fn merge_desired(&mut self, desired: &HelmRelease) -> bool {
        let mut spec = desired.spec.clone();
        spec.suspend = self.spec.suspend;
        let mut changed = merge_metadata(&mut self.metadata, &desired.metadata);
        if self.spec != spec {
            self.spec = spec;
            changed = true;
        }
        changed
    }

    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == READY_CONDITION))
    }

    pub fn is_ready(&self) -> bool {
        self.ready_condition().is_some_and(|c| c.status == CONDITION_TRUE)
    }
}

/// Copy labels and owner references of `desired` into `current`
fn merge_metadata(current: &mut ObjectMeta, desired: &ObjectMeta) -> bool {
    let mut changed = false;
    if let Some(wanted) = &desired.labels {
        let labels = current.labels.get_or_insert_with(BTreeMap::new);
        for (k, v) in wanted {
            if labels.get(k) != Some(v) {
                labels.insert(k.clone(), v.clone());
                changed = true;
            }
        }
    }
    if let Some(wanted) = &desired.owner_references {
        let owners = current.owner_references.get_or_insert_with(Vec::new);
        for owner in wanted {
            if !owners.iter().any(|o| o.uid == owner.uid) {
                owners.push(owner.clone());
                changed = true;
            }
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Sveltos add-on profile
// ---------------------------------------------------------------------------

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "config.projectsveltos.io",
    version = "v1beta1",
    kind = "Profile",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSpec {
    pub cluster_selector: ProfileClusterSelector,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helm_charts: Vec<ProfileHelmChart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileClusterSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

/// One chart installation fanned out to matching clusters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileHelmChart {
    #[serde(rename = "repositoryURL")]
    pub repository_url: String,
    pub repository_name: String,
    pub chart_name: String,
    pub chart_version: String,
    pub release_name: String,
    pub release_namespace: String,
    /// Always "Install"; omitted charts are uninstalled by the profile engine
    pub helm_chart_action: String,

    /// Values rendered as YAML
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProfileHelmOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_credentials_config: Option<ProfileRegistryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileHelmOptions {
    pub install_options: ProfileInstallOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInstallOptions {
    #[serde(default)]
    pub create_namespace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRegistryConfig {
    #[serde(default, rename = "plainHTTP")]
    pub plain_http: bool,

    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
}

/// Desired state of an add-on profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileOptions {
    pub match_labels: BTreeMap<String, String>,
    pub helm_charts: Vec<ProfileHelmChart>,
    pub owner_reference: Option<OwnerReference>,
}

impl Profile {
    pub fn desired(name: &str, namespace: &str, opts: &ProfileOptions) -> Self {
        Profile {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                owner_references: opts.owner_reference.clone().map(|o| vec![o]),
                ..Default::default()
            },
            spec: ProfileSpec {
                cluster_selector: ProfileClusterSelector {
                    match_labels: opts.match_labels.clone(),
                },
                helm_charts: opts.helm_charts.clone(),
            },
        }
    }

    pub fn merge_desired(&mut self, desired: &Profile) -> bool {
        let mut changed = merge_metadata(&mut self.metadata, &desired.metadata);
        if self.spec != desired.spec {
            self.spec = desired.spec.clone();
            changed = true;
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Cluster API infrastructure
// ---------------------------------------------------------------------------

/// Minimal view of an unstructured Cluster API object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InfraObject {
    pub name: String,
    pub namespace: String,
    pub resource_version: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    /// Raw `.status`, if any
    pub status: Option<serde_json::Value>,
}
