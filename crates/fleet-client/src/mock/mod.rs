//! Mock fleet collaborators for unit testing
//!
//! In-memory implementations of [`FleetClientTrait`] and [`ChartLoader`] so
//! reconcilers can be exercised without an API server.
//!
//! - `mod.rs` - the object store and the `FleetClientTrait` implementation
//! - `charts.rs` - `MockChartLoader`
//!
//! Every write that changes stored state is appended to an operations log
//! (`"<verb> <Kind> <namespace>/<name>"`), which tests use to assert ordering
//! and idempotence.

mod charts;

pub use charts::MockChartLoader;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use crds::{ClusterTemplate, ManagedCluster, Management, ProviderTemplate, ServiceTemplate, TemplateKind, TemplateStatus};
use kube::api::GroupVersionKind;
use kube::{Resource, ResourceExt};

use crate::error::FleetError;
use crate::fleet_trait::FleetClientTrait;
use crate::models::{
    labels_match, HelmChart, HelmRelease, HelmRepository, InfraObject, ManagedKind, OperationResult, Profile,
    ProfileOptions, ReleaseOptions,
};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn obj_key<K: Resource>(obj: &K) -> Key {
    key(
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default(),
    )
}

fn gvk_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

#[derive(Default)]
struct MockState {
    managements: BTreeMap<String, Management>,
    cluster_templates: BTreeMap<Key, ClusterTemplate>,
    service_templates: BTreeMap<Key, ServiceTemplate>,
    provider_templates: BTreeMap<Key, ProviderTemplate>,
    managed_clusters: BTreeMap<Key, ManagedCluster>,
    helm_charts: BTreeMap<Key, HelmChart>,
    helm_repositories: BTreeMap<Key, HelmRepository>,
    helm_releases: BTreeMap<Key, HelmRelease>,
    profiles: BTreeMap<Key, Profile>,
    infrastructure: BTreeMap<String, Vec<InfraObject>>,
    api_groups: BTreeSet<String>,
    release_errors: BTreeMap<String, String>,
    hold_release_deletions: bool,
    operations: Vec<String>,
    resource_version: u64,
}

impl MockState {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn stamp<K: Resource>(&mut self, obj: &mut K) {
        obj.meta_mut().resource_version = Some(self.next_resource_version());
    }

    fn record(&mut self, op: impl Into<String>) {
        self.operations.push(op.into());
    }
}

/// Reject a write whose resource version does not match the stored object
fn check_version(stored: Option<&str>, incoming: Option<&str>, what: &str) -> Result<(), FleetError> {
    match incoming {
        Some(rv) if stored != Some(rv) => Err(FleetError::Conflict(format!(
            "{what}: resource version {rv} does not match {}",
            stored.unwrap_or("<none>")
        ))),
        _ => Ok(()),
    }
}

/// Mock fleet client for testing
///
/// Objects added through the `add_*` methods are stored with a fresh resource
/// version; use the returned copy when handing the object to a reconciler.
#[derive(Clone, Default)]
pub struct MockFleetClient {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockFleetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFleetClient").finish_non_exhaustive()
    }
}

impl MockFleetClient {
    /// Create an empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------------
    // Setup
    // ---------------------------------------------------------------------

    pub fn add_management(&self, mut management: Management) -> Management {
        let mut state = self.lock();
        state.stamp(&mut management);
        state.managements.insert(management.name_any(), management.clone());
        management
    }

    pub fn add_cluster_template(&self, mut template: ClusterTemplate) -> ClusterTemplate {
        let mut state = self.lock();
        state.stamp(&mut template);
        state.cluster_templates.insert(obj_key(&template), template.clone());
        template
    }

    pub fn add_service_template(&self, mut template: ServiceTemplate) -> ServiceTemplate {
        let mut state = self.lock();
        state.stamp(&mut template);
        state.service_templates.insert(obj_key(&template), template.clone());
        template
    }

    pub fn add_provider_template(&self, mut template: ProviderTemplate) -> ProviderTemplate {
        let mut state = self.lock();
        state.stamp(&mut template);
        state.provider_templates.insert(obj_key(&template), template.clone());
        template
    }

    pub fn add_managed_cluster(&self, mut cluster: ManagedCluster) -> ManagedCluster {
        let mut state = self.lock();
        state.stamp(&mut cluster);
        state.managed_clusters.insert(obj_key(&cluster), cluster.clone());
        cluster
    }

    pub fn add_helm_chart(&self, mut chart: HelmChart) -> HelmChart {
        let mut state = self.lock();
        state.stamp(&mut chart);
        state.helm_charts.insert(obj_key(&chart), chart.clone());
        chart
    }

    pub fn add_helm_repository(&self, mut repository: HelmRepository) -> HelmRepository {
        let mut state = self.lock();
        state.stamp(&mut repository);
        state.helm_repositories.insert(obj_key(&repository), repository.clone());
        repository
    }

    pub fn add_helm_release(&self, mut release: HelmRelease) -> HelmRelease {
        let mut state = self.lock();
        state.stamp(&mut release);
        state.helm_releases.insert(obj_key(&release), release.clone());
        release
    }

    pub fn add_infrastructure_object(&self, gvk: &GroupVersionKind, mut object: InfraObject) -> InfraObject {
        let mut state = self.lock();
        object.resource_version = Some(state.next_resource_version());
        state.infrastructure.entry(gvk_key(gvk)).or_default().push(object.clone());
        object
    }

    /// Mark an API group/version (e.g. "cert-manager.io/v1") as served
    pub fn add_api_group(&self, group_version: &str) {
        self.lock().api_groups.insert(group_version.to_string());
    }

    /// Make `reconcile_helm_release` fail for the named release
    pub fn fail_release(&self, name: &str, message: &str) {
        self.lock().release_errors.insert(name.to_string(), message.to_string());
    }

    /// Keep releases in the store after deletion is issued, as if Flux were
    /// still uninstalling them
    pub fn hold_release_deletions(&self, hold: bool) {
        self.lock().hold_release_deletions = hold;
    }

    /// Replace the status of a stored release (simulates helm-controller)
    pub fn set_helm_release_status(&self, namespace: &str, name: &str, status: crate::models::HelmReleaseStatus) {
        if let Some(release) = self.lock().helm_releases.get_mut(&key(namespace, name)) {
            release.status = Some(status);
        }
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    /// All state-changing operations performed so far
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    pub fn management(&self, name: &str) -> Option<Management> {
        self.lock().managements.get(name).cloned()
    }

    pub fn template_status(&self, kind: TemplateKind, namespace: &str, name: &str) -> Option<TemplateStatus> {
        let state = self.lock();
        let k = key(namespace, name);
        match kind {
            TemplateKind::Cluster => state.cluster_templates.get(&k).and_then(|t| t.status.clone()),
            TemplateKind::Service => state.service_templates.get(&k).and_then(|t| t.status.clone()),
            TemplateKind::Provider => state.provider_templates.get(&k).and_then(|t| t.status.clone()),
        }
    }

    pub fn managed_cluster(&self, namespace: &str, name: &str) -> Option<ManagedCluster> {
        self.lock().managed_clusters.get(&key(namespace, name)).cloned()
    }

    pub fn helm_chart(&self, namespace: &str, name: &str) -> Option<HelmChart> {
        self.lock().helm_charts.get(&key(namespace, name)).cloned()
    }

    pub fn helm_repository(&self, namespace: &str, name: &str) -> Option<HelmRepository> {
        self.lock().helm_repositories.get(&key(namespace, name)).cloned()
    }

    pub fn helm_release(&self, namespace: &str, name: &str) -> Option<HelmRelease> {
        self.lock().helm_releases.get(&key(namespace, name)).cloned()
    }

    pub fn helm_releases(&self) -> Vec<HelmRelease> {
        self.lock().helm_releases.values().cloned().collect()
    }

    pub fn profile(&self, namespace: &str, name: &str) -> Option<Profile> {
        self.lock().profiles.get(&key(namespace, name)).cloned()
    }

    pub fn infrastructure_objects(&self, gvk: &GroupVersionKind) -> Vec<InfraObject> {
        self.lock().infrastructure.get(&gvk_key(gvk)).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FleetClientTrait for MockFleetClient {
    async fn get_management(&self, name: &str) -> Result<Option<Management>, FleetError> {
        Ok(self.management(name))
    }

    async fn create_management(&self, management: &Management) -> Result<Management, FleetError> {
        let mut state = self.lock();
        let name = management.name_any();
        if state.managements.contains_key(&name) {
            return Err(FleetError::Conflict(format!("Management {name} already exists")));
        }
        let mut created = management.clone();
        state.stamp(&mut created);
        state.managements.insert(name.clone(), created.clone());
        state.record(format!("create Management {name}"));
        Ok(created)
    }

    async fn update_management(&self, management: &Management) -> Result<Management, FleetError> {
        let mut state = self.lock();
        let name = management.name_any();
        let stored = state
            .managements
            .get(&name)
            .ok_or_else(|| FleetError::NotFound(format!("Management {name}")))?;
        check_version(stored.resource_version().as_deref(), management.resource_version().as_deref(), &name)?;
        let mut updated = management.clone();
        updated.status = stored.status.clone();
        state.stamp(&mut updated);
        state.managements.insert(name.clone(), updated.clone());
        state.record(format!("update Management {name}"));
        Ok(updated)
    }

    async fn update_management_status(&self, management: &Management) -> Result<(), FleetError> {
        let mut state = self.lock();
        let name = management.name_any();
        let stored = state
            .managements
            .get(&name)
            .ok_or_else(|| FleetError::NotFound(format!("Management {name}")))?;
        check_version(stored.resource_version().as_deref(), management.resource_version().as_deref(), &name)?;
        let mut updated = stored.clone();
        updated.status = management.status.clone();
        state.stamp(&mut updated);
        state.managements.insert(name.clone(), updated);
        state.record(format!("update_status Management {name}"));
        Ok(())
    }

    async fn get_cluster_template(&self, namespace: &str, name: &str) -> Result<Option<ClusterTemplate>, FleetError> {
        Ok(self.lock().cluster_templates.get(&key(namespace, name)).cloned())
    }

    async fn get_service_template(&self, namespace: &str, name: &str) -> Result<Option<ServiceTemplate>, FleetError> {
        Ok(self.lock().service_templates.get(&key(namespace, name)).cloned())
    }

    async fn get_provider_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProviderTemplate>, FleetError> {
        Ok(self.lock().provider_templates.get(&key(namespace, name)).cloned())
    }

    async fn update_template_status(
        &self,
        kind: TemplateKind,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &TemplateStatus,
    ) -> Result<(), FleetError> {
        let mut state = self.lock();
        let k = key(namespace, name);
        let rv = state.next_resource_version();
        let stored_rv = match kind {
            TemplateKind::Cluster => state.cluster_templates.get_mut(&k).map(|t| {
                let previous = t.resource_version();
                if resource_version.is_none() || previous.as_deref() == resource_version {
                    t.status = Some(status.clone());
                    t.metadata.resource_version = Some(rv.clone());
                }
                previous
            }),
            TemplateKind::Service => state.service_templates.get_mut(&k).map(|t| {
                let previous = t.resource_version();
                if resource_version.is_none() || previous.as_deref() == resource_version {
                    t.status = Some(status.clone());
                    t.metadata.resource_version = Some(rv.clone());
                }
                previous
            }),
            TemplateKind::Provider => state.provider_templates.get_mut(&k).map(|t| {
                let previous = t.resource_version();
                if resource_version.is_none() || previous.as_deref() == resource_version {
                    t.status = Some(status.clone());
                    t.metadata.resource_version = Some(rv.clone());
                }
                previous
            }),
        };
        let stored_rv = stored_rv.ok_or_else(|| FleetError::NotFound(format!("{} {namespace}/{name}", kind.kind_name())))?;
        check_version(stored_rv.as_deref(), resource_version, name)?;
        state.record(format!("update_status {} {namespace}/{name}", kind.kind_name()));
        Ok(())
    }

    async fn update_managed_cluster(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, FleetError> {
        let mut state = self.lock();
        let k = obj_key(cluster);
        let stored = state
            .managed_clusters
            .get(&k)
            .ok_or_else(|| FleetError::NotFound(format!("ManagedCluster {}/{}", k.0, k.1)))?;
        check_version(stored.resource_version().as_deref(), cluster.resource_version().as_deref(), &k.1)?;
        let mut updated = cluster.clone();
        updated.status = stored.status.clone();
        state.stamp(&mut updated);
        state.managed_clusters.insert(k.clone(), updated.clone());
        state.record(format!("update ManagedCluster {}/{}", k.0, k.1));
        Ok(updated)
    }

    async fn update_managed_cluster_status(&self, cluster: &ManagedCluster) -> Result<(), FleetError> {
        let mut state = self.lock();
        let k = obj_key(cluster);
        let stored = state
            .managed_clusters
            .get(&k)
            .ok_or_else(|| FleetError::NotFound(format!("ManagedCluster {}/{}", k.0, k.1)))?;
        check_version(stored.resource_version().as_deref(), cluster.resource_version().as_deref(), &k.1)?;
        let mut updated = stored.clone();
        updated.status = cluster.status.clone();
        state.stamp(&mut updated);
        state.managed_clusters.insert(k.clone(), updated);
        state.record(format!("update_status ManagedCluster {}/{}", k.0, k.1));
        Ok(())
    }

    async fn get_helm_chart(&self, namespace: &str, name: &str) -> Result<Option<HelmChart>, FleetError> {
        Ok(self.helm_chart(namespace, name))
    }

    async fn apply_helm_chart(&self, chart: &HelmChart) -> Result<HelmChart, FleetError> {
        let mut state = self.lock();
        let k = obj_key(chart);
        let mut applied = chart.clone();
        match state.helm_charts.get(&k) {
            Some(existing) if existing.spec == chart.spec && existing.metadata.labels == chart.metadata.labels => {
                return Ok(existing.clone());
            }
            Some(existing) => {
                applied.status = existing.status.clone();
                state.record(format!("update HelmChart {}/{}", k.0, k.1));
            }
            None => state.record(format!("create HelmChart {}/{}", k.0, k.1)),
        }
        state.stamp(&mut applied);
        state.helm_charts.insert(k, applied.clone());
        Ok(applied)
    }

    async fn get_helm_repository(&self, namespace: &str, name: &str) -> Result<Option<HelmRepository>, FleetError> {
        Ok(self.helm_repository(namespace, name))
    }

    async fn apply_helm_repository(&self, repository: &HelmRepository) -> Result<HelmRepository, FleetError> {
        let mut state = self.lock();
        let k = obj_key(repository);
        let mut applied = repository.clone();
        match state.helm_repositories.get(&k) {
            Some(existing) if existing.spec == repository.spec => return Ok(existing.clone()),
            Some(existing) => {
                applied.status = existing.status.clone();
                state.record(format!("update HelmRepository {}/{}", k.0, k.1));
            }
            None => state.record(format!("create HelmRepository {}/{}", k.0, k.1)),
        }
        state.stamp(&mut applied);
        state.helm_repositories.insert(k, applied.clone());
        Ok(applied)
    }

    async fn get_helm_release(&self, namespace: &str, name: &str) -> Result<Option<HelmRelease>, FleetError> {
        Ok(self.helm_release(namespace, name))
    }

    async fn reconcile_helm_release(
        &self,
        name: &str,
        namespace: &str,
        opts: &ReleaseOptions,
    ) -> Result<(HelmRelease, OperationResult), FleetError> {
        let mut state = self.lock();
        if let Some(message) = state.release_errors.get(name) {
            return Err(FleetError::InvalidRequest(message.clone()));
        }
        let k = key(namespace, name);
        let desired = HelmRelease::desired(name, namespace, opts);
        match state.helm_releases.get(&k).cloned() {
            None => {
                let mut created = desired;
                state.stamp(&mut created);
                state.helm_releases.insert(k, created.clone());
                state.record(format!("create HelmRelease {namespace}/{name}"));
                Ok((created, OperationResult::Created))
            }
            Some(mut existing) => {
                if !existing.merge_desired(&desired) {
                    return Ok((existing, OperationResult::Unchanged));
                }
                state.stamp(&mut existing);
                state.helm_releases.insert(k, existing.clone());
                state.record(format!("update HelmRelease {namespace}/{name}"));
                Ok((existing, OperationResult::Updated))
            }
        }
    }

    async fn suspend_helm_release(&self, release: &HelmRelease) -> Result<(), FleetError> {
        let mut state = self.lock();
        let k = obj_key(release);
        let rv = state.next_resource_version();
        let stored = state
            .helm_releases
            .get_mut(&k)
            .ok_or_else(|| FleetError::NotFound(format!("HelmRelease {}/{}", k.0, k.1)))?;
        check_version(stored.resource_version().as_deref(), release.resource_version().as_deref(), &k.1)?;
        stored.spec.suspend = true;
        stored.metadata.resource_version = Some(rv);
        state.record(format!("suspend HelmRelease {}/{}", k.0, k.1));
        Ok(())
    }

    async fn delete_helm_release(&self, namespace: &str, name: &str) -> Result<(), FleetError> {
        let mut state = self.lock();
        let k = key(namespace, name);
        if !state.helm_releases.contains_key(&k) {
            return Ok(());
        }
        if !state.hold_release_deletions {
            state.helm_releases.remove(&k);
        }
        state.record(format!("delete HelmRelease {namespace}/{name}"));
        Ok(())
    }

    async fn delete_all_of(&self, kind: ManagedKind, labels: &BTreeMap<String, String>) -> Result<(), FleetError> {
        let mut state = self.lock();
        match kind {
            ManagedKind::HelmRelease => state
                .helm_releases
                .retain(|_, o| !labels_match(o.metadata.labels.as_ref(), labels)),
            ManagedKind::HelmChart => state
                .helm_charts
                .retain(|_, o| !labels_match(o.metadata.labels.as_ref(), labels)),
            ManagedKind::HelmRepository => state
                .helm_repositories
                .retain(|_, o| !labels_match(o.metadata.labels.as_ref(), labels)),
        }
        state.record(format!("delete_all_of {}", kind.as_str()));
        Ok(())
    }

    async fn reconcile_profile(
        &self,
        name: &str,
        namespace: &str,
        opts: &ProfileOptions,
    ) -> Result<(Profile, OperationResult), FleetError> {
        let mut state = self.lock();
        let k = key(namespace, name);
        let desired = Profile::desired(name, namespace, opts);
        match state.profiles.get(&k).cloned() {
            None => {
                let mut created = desired;
                state.stamp(&mut created);
                state.profiles.insert(k, created.clone());
                state.record(format!("create Profile {namespace}/{name}"));
                Ok((created, OperationResult::Created))
            }
            Some(mut existing) => {
                if !existing.merge_desired(&desired) {
                    return Ok((existing, OperationResult::Unchanged));
                }
                state.stamp(&mut existing);
                state.profiles.insert(k, existing.clone());
                state.record(format!("update Profile {namespace}/{name}"));
                Ok((existing, OperationResult::Updated))
            }
        }
    }

    async fn delete_profile(&self, namespace: &str, name: &str) -> Result<(), FleetError> {
        let mut state = self.lock();
        if state.profiles.remove(&key(namespace, name)).is_some() {
            state.record(format!("delete Profile {namespace}/{name}"));
        }
        Ok(())
    }

    async fn list_infrastructure(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        limit: Option<u32>,
    ) -> Result<Vec<InfraObject>, FleetError> {
        let state = self.lock();
        let matching = state
            .infrastructure
            .get(&gvk_key(gvk))
            .into_iter()
            .flatten()
            .filter(|o| o.namespace == namespace && labels_match(Some(&o.labels), labels))
            .cloned();
        Ok(match limit {
            Some(limit) => matching.take(limit as usize).collect(),
            None => matching.collect(),
        })
    }

    async fn patch_infrastructure_finalizers(
        &self,
        gvk: &GroupVersionKind,
        object: &InfraObject,
        finalizers: Vec<String>,
    ) -> Result<(), FleetError> {
        let mut state = self.lock();
        let rv = state.next_resource_version();
        let stored = state
            .infrastructure
            .get_mut(&gvk_key(gvk))
            .and_then(|objs| {
                objs.iter_mut()
                    .find(|o| o.namespace == object.namespace && o.name == object.name)
            })
            .ok_or_else(|| FleetError::NotFound(format!("{} {}/{}", gvk.kind, object.namespace, object.name)))?;
        check_version(stored.resource_version.as_deref(), object.resource_version.as_deref(), &object.name)?;
        stored.finalizers = finalizers;
        stored.resource_version = Some(rv);
        state.record(format!("patch_finalizers {} {}/{}", gvk.kind, object.namespace, object.name));
        Ok(())
    }

    async fn api_available(&self, group_version: &str) -> Result<bool, FleetError> {
        Ok(self.lock().api_groups.contains(group_version))
    }
}
