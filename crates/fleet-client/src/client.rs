//! Kubernetes-backed implementation of [`FleetClientTrait`]
//!
//! Typed `Api`s for the fleet, Flux and Sveltos kinds; `DynamicObject` for the
//! provider-specific Cluster API kinds, which are only known at runtime.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use crds::{ClusterTemplate, ManagedCluster, Management, ProviderTemplate, ServiceTemplate, TemplateKind, TemplateStatus};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::error::FleetError;
use crate::fleet_trait::FleetClientTrait;
use crate::models::{
    selector_string, HelmChart, HelmRelease, HelmRepository, InfraObject, ManagedKind, OperationResult, Profile,
    ProfileOptions, ReleaseOptions,
};

/// Fleet client talking to the Kubernetes API server
#[derive(Clone)]
pub struct FleetClient {
    client: Client,
}

impl std::fmt::Debug for FleetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetClient").finish_non_exhaustive()
    }
}

impl FleetClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn delete_labelled<K>(&self, labels: &BTreeMap<String, String>) -> Result<(), FleetError>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    {
        let all: Api<K> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&selector_string(labels));
        for obj in all.list(&lp).await? {
            let namespace = obj.namespace().unwrap_or_default();
            let api: Api<K> = self.namespaced(&namespace);
            delete_ignoring_missing(&api, &obj.name_any()).await?;
        }
        Ok(())
    }
}

/// Map optimistic-concurrency failures to [`FleetError::Conflict`]
fn conflict_aware(err: kube::Error) -> FleetError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => FleetError::Conflict(ae.message.clone()),
        other => FleetError::Kube(other),
    }
}

async fn delete_ignoring_missing<K>(api: &Api<K>, name: &str) -> Result<(), FleetError>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create the object, or replace the existing one keeping its finalizers and annotations
async fn create_or_replace<K>(api: &Api<K>, desired: &K) -> Result<K, FleetError>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| FleetError::InvalidRequest("object has no name".to_string()))?;
    match api.get_opt(&name).await? {
        None => api.create(&PostParams::default(), desired).await.map_err(conflict_aware),
        Some(existing) => {
            let mut updated = desired.clone();
            let meta = updated.meta_mut();
            meta.resource_version = existing.meta().resource_version.clone();
            meta.finalizers = existing.meta().finalizers.clone();
            meta.annotations = existing.meta().annotations.clone();
            api.replace(&name, &PostParams::default(), &updated)
                .await
                .map_err(conflict_aware)
        }
    }
}

/// Merge-patch the status subresource, guarded by `resource_version` when given
async fn patch_status<K, S>(api: &Api<K>, name: &str, resource_version: Option<&str>, status: &S) -> Result<(), FleetError>
where
    K: Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let mut patch = json!({ "status": status });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(conflict_aware)?;
    Ok(())
}

#[async_trait]
impl FleetClientTrait for FleetClient {
    async fn get_management(&self, name: &str) -> Result<Option<Management>, FleetError> {
        let api: Api<Management> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_management(&self, management: &Management) -> Result<Management, FleetError> {
        let api: Api<Management> = Api::all(self.client.clone());
        api.create(&PostParams::default(), management).await.map_err(conflict_aware)
    }

    async fn update_management(&self, management: &Management) -> Result<Management, FleetError> {
        let api: Api<Management> = Api::all(self.client.clone());
        api.replace(&management.name_any(), &PostParams::default(), management)
            .await
            .map_err(conflict_aware)
    }

    async fn update_management_status(&self, management: &Management) -> Result<(), FleetError> {
        let api: Api<Management> = Api::all(self.client.clone());
        patch_status(
            &api,
            &management.name_any(),
            management.resource_version().as_deref(),
            &management.status,
        )
        .await
    }

    async fn get_cluster_template(&self, namespace: &str, name: &str) -> Result<Option<ClusterTemplate>, FleetError> {
        Ok(self.namespaced::<ClusterTemplate>(namespace).get_opt(name).await?)
    }

    async fn get_service_template(&self, namespace: &str, name: &str) -> Result<Option<ServiceTemplate>, FleetError> {
        Ok(self.namespaced::<ServiceTemplate>(namespace).get_opt(name).await?)
    }

    async fn get_provider_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProviderTemplate>, FleetError> {
        Ok(self.namespaced::<ProviderTemplate>(namespace).get_opt(name).await?)
    }

    async fn update_template_status(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &TemplateStatus,
    ) -> Result<(), FleetError> {
        match kind {
            TemplateKind::Cluster => {
                patch_status(&self.namespaced::<ClusterTemplate>(namespace), name, resource_version, status).await
            }
            TemplateKind::Service => {
                patch_status(&self.namespaced::<ServiceTemplate>(namespace), name, resource_version, status).await
            }
            TemplateKind::Provider => {
                patch_status(&self.namespaced::<ProviderTemplate>(namespace), name, resource_version, status).await
            }
        }
    }

    async fn update_managed_cluster(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, FleetError> {
        let namespace = cluster.namespace().unwrap_or_default();
        self.namespaced::<ManagedCluster>(&namespace)
            .replace(&cluster.name_any(), &PostParams::default(), cluster)
            .await
            .map_err(conflict_aware)
    }

    async fn update_managed_cluster_status(&self, cluster: &ManagedCluster) -> Result<(), FleetError> {
        let namespace = cluster.namespace().unwrap_or_default();
        patch_status(
            &self.namespaced::<ManagedCluster>(&namespace),
            &cluster.name_any(),
            cluster.resource_version().as_deref(),
            &cluster.status,
        )
        .await
    }

    async fn get_helm_chart(&self, namespace: &str, name: &str) -> Result<Option<HelmChart>, FleetError> {
        Ok(self.namespaced::<HelmChart>(namespace).get_opt(name).await?)
    }

    async fn apply_helm_chart(&self, chart: &HelmChart) -> Result<HelmChart, FleetError> {
        let namespace = chart.namespace().unwrap_or_default();
        create_or_replace(&self.namespaced::<HelmChart>(&namespace), chart).await
    }

    async fn get_helm_repository(&self, namespace: &str, name: &str) -> Result<Option<HelmRepository>, FleetError> {
        Ok(self.namespaced::<HelmRepository>(namespace).get_opt(name).await?)
    }

    async fn apply_helm_repository(&self, repository: &HelmRepository) -> Result<HelmRepository, FleetError> {
        let namespace = repository.namespace().unwrap_or_default();
        create_or_replace(&self.namespaced::<HelmRepository>(&namespace), repository).await
    }

    async fn get_helm_release(&self, namespace: &str, name: &str) -> Result<Option<HelmRelease>, FleetError> {
        Ok(self.namespaced::<HelmRelease>(namespace).get_opt(name).await?)
    }

    async fn reconcile_helm_release(
        &self,
        name: &str,
        namespace: &str,
        opts: &ReleaseOptions,
    ) -> Result<(HelmRelease, OperationResult), FleetError> {
        let api = self.namespaced::<HelmRelease>(namespace);
        let desired = HelmRelease::desired(name, namespace, opts);
        match api.get_opt(name).await? {
            None => {
                info!("Creating HelmRelease {}/{}", namespace, name);
                let created = api.create(&PostParams::default(), &desired).await.map_err(conflict_aware)?;
                Ok((created, OperationResult::Created))
            }
            Some(mut existing) => {
                if !existing.merge_desired(&desired) {
                    return Ok((existing, OperationResult::Unchanged));
                }
                info!("Updating HelmRelease {}/{}", namespace, name);
                let updated = api
                    .replace(name, &PostParams::default(), &existing)
                    .await
                    .map_err(conflict_aware)?;
                Ok((updated, OperationResult::Updated))
            }
        }
    }

    async fn suspend_helm_release(&self, release: &HelmRelease) -> Result<(), FleetError> {
        let namespace = release.namespace().unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": release.resource_version() },
            "spec": { "suspend": true }
        });
        self.namespaced::<HelmRelease>(&namespace)
            .patch(&release.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(conflict_aware)?;
        Ok(())
    }

    async fn delete_helm_release(&self, namespace: &str, name: &str) -> Result<(), FleetError> {
        delete_ignoring_missing(&self.namespaced::<HelmRelease>(namespace), name).await
    }

    async fn delete_all_of(&self, kind: ManagedKind, labels: &BTreeMap<String, String>) -> Result<(), FleetError> {
        debug!("Deleting all {} matching {:?}", kind.as_str(), labels);
        match kind {
            ManagedKind::HelmRelease => self.delete_labelled::<HelmRelease>(labels).await,
            ManagedKind::HelmChart => self.delete_labelled::<HelmChart>(labels).await,
            ManagedKind::HelmRepository => self.delete_labelled::<HelmRepository>(labels).await,
        }
    }

    async fn reconcile_profile(
        &self,
        name: &str,
        namespace: &str,
        opts: &ProfileOptions,
    ) -> Result<(Profile, OperationResult), FleetError> {
        let api = self.namespaced::<Profile>(namespace);
        let desired = Profile::desired(name, namespace, opts);
        match api.get_opt(name).await? {
            None => {
                let created = api.create(&PostParams::default(), &desired).await.map_err(conflict_aware)?;
                Ok((created, OperationResult::Created))
            }
            Some(mut existing) => {
                if !existing.merge_desired(&desired) {
                    return Ok((existing, OperationResult::Unchanged));
                }
                let updated = api
                    .replace(name, &PostParams::default(), &existing)
                    .await
                    .map_err(conflict_aware)?;
                Ok((updated, OperationResult::Updated))
            }
        }
    }

    async fn delete_profile(&self, namespace: &str, name: &str) -> Result<(), FleetError> {
        delete_ignoring_missing(&self.namespaced::<Profile>(namespace), name).await
    }

    async fn list_infrastructure(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        limit: Option<u32>,
    ) -> Result<Vec<InfraObject>, FleetError> {
        let ar = ApiResource::from_gvk(gvk);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let mut lp = ListParams::default().labels(&selector_string(labels));
        if let Some(limit) = limit {
            lp = lp.limit(limit);
        }
        let objects = api.list(&lp).await?;
        Ok(objects
            .items
            .into_iter()
            .map(|obj| InfraObject {
                name: obj.name_any(),
                namespace: obj.namespace().unwrap_or_else(|| namespace.to_string()),
                resource_version: obj.resource_version(),
                labels: obj.metadata.labels.clone().unwrap_or_default(),
                finalizers: obj.metadata.finalizers.clone().unwrap_or_default(),
                status: obj.data.get("status").cloned(),
            })
            .collect())
    }

    async fn patch_infrastructure_finalizers(
        &self,
        gvk: &GroupVersionKind,
        object: &InfraObject,
        finalizers: Vec<String>,
    ) -> Result<(), FleetError> {
        let ar = ApiResource::from_gvk(gvk);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &object.namespace, &ar);
        let patch = json!({
            "metadata": {
                "resourceVersion": object.resource_version,
                "finalizers": finalizers,
            }
        });
        api.patch(&object.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(conflict_aware)?;
        Ok(())
    }

    async fn api_available(&self, group_version: &str) -> Result<bool, FleetError> {
        let (group, version) = group_version.split_once('/').unwrap_or(("", group_version));
        let groups = self.client.list_api_groups().await?;
        Ok(groups
            .groups
            .iter()
            .any(|g| g.name == group && g.versions.iter().any(|v| v.version == version)))
    }
}
