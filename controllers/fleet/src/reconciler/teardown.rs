//! Teardown sequencing
//!
//! Platform teardown removes everything the installer generated. The provider
//! release gate keeps a cluster's infrastructure object blocked until no
//! compute members of the cluster remain.

use std::collections::BTreeMap;

use crds::constants::{
    BLOCKING_FINALIZER, CLUSTER_NAME_LABEL_KEY, DEFAULT_CORE_PLATFORM_TEMPLATE, FLUX_HELM_CHART_NAME_KEY,
    MANAGEMENT_FINALIZER,
};
use crds::Management;
use fleet_client::{managed_labels, ManagedKind};
use kube::api::GroupVersionKind;
use kube_runtime::controller::Action;
use tracing::{debug, info};

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::remove_finalizer;

/// Infrastructure cluster kind for a provider name
///
/// Accepts both the bare name (`aws`) and the prefixed provider name
/// (`infrastructure-aws`).
pub fn infrastructure_kind(provider: &str) -> Option<GroupVersionKind> {
    let provider = provider.strip_prefix("infrastructure-").unwrap_or(provider);
    let (version, kind) = match provider {
        "aws" => ("v1beta2", "AWSCluster"),
        "azure" => ("v1beta1", "AzureCluster"),
        "vsphere" => ("v1beta1", "VSphereCluster"),
        _ => return None,
    };
    Some(GroupVersionKind::gvk("infrastructure.cluster.x-k8s.io", version, kind))
}

pub fn machine_kind() -> GroupVersionKind {
    GroupVersionKind::gvk("cluster.x-k8s.io", "v1beta1", "Machine")
}

pub fn cluster_kind() -> GroupVersionKind {
    GroupVersionKind::gvk("cluster.x-k8s.io", "v1beta1", "Cluster")
}

impl Reconciler {
    /// Remove every release, chart and repository the installer created, then
    /// release the Management finalizer.
    pub(crate) async fn teardown_platform(&self, management: &Management) -> Result<Action, ControllerError> {
        let namespace = &self.config.system_namespace;
        info!("Tearing down platform components in {}", namespace);

        let platform = management
            .spec
            .core
            .as_ref()
            .map(|core| core.platform.template.as_str())
            .unwrap_or(DEFAULT_CORE_PLATFORM_TEMPLATE);

        // The platform release hosts this controller; stop Flux from acting on it first
        if let Some(release) = self.client.get_helm_release(namespace, platform).await? {
            if !release.spec.suspend {
                self.client.suspend_helm_release(&release).await?;
            }
        }

        let labels = managed_labels();
        for kind in [ManagedKind::HelmRelease, ManagedKind::HelmChart, ManagedKind::HelmRepository] {
            debug!("Removing managed {} objects", kind.as_str());
            self.client.delete_all_of(kind, &labels).await?;
        }

        let mut updated = management.clone();
        if remove_finalizer(&mut updated.metadata, MANAGEMENT_FINALIZER) {
            self.client.update_management(&updated).await?;
        }
        info!("Platform teardown complete");
        Ok(Action::await_change())
    }

    /// Provider release gate for one cluster.
    ///
    /// For every infrastructure object created by the cluster's release, drop
    /// the blocking finalizer once the cluster has no Machines left. Returns
    /// true when nothing blocks deletion any more.
    pub(crate) async fn release_cluster(
        &self,
        name: &str,
        namespace: &str,
        infrastructure_providers: &[String],
    ) -> Result<bool, ControllerError> {
        let release_labels = BTreeMap::from([(FLUX_HELM_CHART_NAME_KEY.to_string(), name.to_string())]);

        let mut released = true;
        for provider in infrastructure_providers {
            let Some(gvk) = infrastructure_kind(provider) else {
                debug!("No infrastructure kind known for provider {}", provider);
                continue;
            };

            let objects = self
                .client
                .list_infrastructure(&gvk, namespace, &release_labels, None)
                .await?;
            for object in objects {
                if !object.finalizers.iter().any(|f| f == BLOCKING_FINALIZER) {
                    continue;
                }
                // Machines are labelled with the infrastructure object's name
                let machine_labels = BTreeMap::from([(CLUSTER_NAME_LABEL_KEY.to_string(), object.name.clone())]);
                let machines = self
                    .client
                    .list_infrastructure(&machine_kind(), namespace, &machine_labels, Some(1))
                    .await?;
                if !machines.is_empty() {
                    info!(
                        "Cluster {}/{} of {} still has machines, keeping the {}",
                        namespace, object.name, name, gvk.kind
                    );
                    released = false;
                    continue;
                }

                let finalizers = object
                    .finalizers
                    .iter()
                    .filter(|f| *f != BLOCKING_FINALIZER)
                    .cloned()
                    .collect();
                info!("Releasing {} {}/{}", gvk.kind, object.namespace, object.name);
                self.client
                    .patch_infrastructure_finalizers(&gvk, &object, finalizers)
                    .await?;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
#[path = "teardown_test.rs"]
mod teardown_test;
