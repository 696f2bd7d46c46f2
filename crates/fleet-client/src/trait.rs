//! Traits for the fleet controllers' collaborators
//!
//! [`FleetClientTrait`] covers everything read from or written to the cluster:
//! fleet CRDs, Flux chart sources and releases, the Sveltos profile and Cluster
//! API infrastructure objects. [`ChartLoader`] covers fetching and checking
//! chart archives. Both are mocked in unit tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use crds::{ClusterTemplate, ManagedCluster, Management, ProviderTemplate, ServiceTemplate, TemplateKind, TemplateStatus};
use kube::api::GroupVersionKind;

use crate::chart::Chart;
use crate::error::FleetError;
use crate::models::{
    Artifact, HelmChart, HelmRelease, HelmRepository, InfraObject, ManagedKind, OperationResult, Profile,
    ProfileOptions, ReleaseOptions,
};

/// Cluster-side operations used by the reconcilers
#[async_trait]
pub trait FleetClientTrait: Send + Sync {
    // Management

    async fn get_management(&self, name: &str) -> Result<Option<Management>, FleetError>;

    async fn create_management(&self, management: &Management) -> Result<Management, FleetError>;

    /// Replace spec and metadata, guarded by the object's resource version
    async fn update_management(&self, management: &Management) -> Result<Management, FleetError>;

    async fn update_management_status(&self, management: &Management) -> Result<(), FleetError>;

    // Templates

    async fn get_cluster_template(&self, namespace: &str, name: &str) -> Result<Option<ClusterTemplate>, FleetError>;

    async fn get_service_template(&self, namespace: &str, name: &str) -> Result<Option<ServiceTemplate>, FleetError>;

    async fn get_provider_template(&self, namespace: &str, name: &str)
    -> Result<Option<ProviderTemplate>, FleetError>;

    async fn update_template_status(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &TemplateStatus,
    ) -> Result<(), FleetError>;

    // ManagedCluster

    async fn update_managed_cluster(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, FleetError>;

    async fn update_managed_cluster_status(&self, cluster: &ManagedCluster) -> Result<(), FleetError>;

    // Chart sources

    async fn get_helm_chart(&self, namespace: &str, name: &str) -> Result<Option<HelmChart>, FleetError>;

    /// Create the chart or update its spec, labels and owners
    async fn apply_helm_chart(&self, chart: &HelmChart) -> Result<HelmChart, FleetError>;

    async fn get_helm_repository(&self, namespace: &str, name: &str) -> Result<Option<HelmRepository>, FleetError>;

    async fn apply_helm_repository(&self, repository: &HelmRepository) -> Result<HelmRepository, FleetError>;

    // Release engine

    async fn get_helm_release(&self, namespace: &str, name: &str) -> Result<Option<HelmRelease>, FleetError>;

    /// Create-or-update a release from its desired options
    async fn reconcile_helm_release(
        &self,
        name: &str,
        namespace: &str,
        opts: &ReleaseOptions,
    ) -> Result<(HelmRelease, OperationResult), FleetError>;

    async fn suspend_helm_release(&self, release: &HelmRelease) -> Result<(), FleetError>;

    /// Issue deletion of a release. A missing release is not an error.
    async fn delete_helm_release(&self, namespace: &str, name: &str) -> Result<(), FleetError>;

    /// Delete every object of `kind`, in any namespace, matching `labels`
    async fn delete_all_of(&self, kind: ManagedKind, labels: &BTreeMap<String, String>) -> Result<(), FleetError>;

    // Add-on profile engine

    async fn reconcile_profile(
        &self,
        name: &str,
        namespace: &str,
        opts: &ProfileOptions,
    ) -> Result<(Profile, OperationResult), FleetError>;

    /// A missing profile is not an error
    async fn delete_profile(&self, namespace: &str, name: &str) -> Result<(), FleetError>;

    // Cluster API

    async fn list_infrastructure(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        limit: Option<u32>,
    ) -> Result<Vec<InfraObject>, FleetError>;

    /// Metadata-only patch of the finalizer list, guarded by the object's
    /// pre-patch resource version
    async fn patch_infrastructure_finalizers(
        &self,
        gvk: &GroupVersionKind,
        object: &InfraObject,
        finalizers: Vec<String>,
    ) -> Result<(), FleetError>;

    // Discovery

    /// Whether `group_version` (e.g. "cert-manager.io/v1") is served
    async fn api_available(&self, group_version: &str) -> Result<bool, FleetError>;
}

/// Fetching and checking chart archives
#[async_trait]
pub trait ChartLoader: Send + Sync {
    async fn download_chart(&self, artifact: &Artifact) -> Result<Chart, FleetError>;

    /// Client-only install simulation of `chart` with `values`
    async fn dry_run_install(
        &self,
        chart: &Chart,
        release_name: &str,
        namespace: &str,
        values: Option<&serde_json::Value>,
    ) -> Result<(), FleetError>;
}
