//! ManagedCluster reconciliation
//!
//! A pass walks the cluster through template validation, chart download and
//! dry run, the cluster release, infrastructure readiness and finally the
//! add-on profile. Every step records a condition; the aggregate `Ready`
//! condition and the status are written on every pass, failing ones included.

use std::collections::BTreeMap;

use crds::constants::{FLUX_HELM_CHART_NAME_KEY, FLUX_HELM_CHART_NAMESPACE_KEY, MANAGED_CLUSTER_FINALIZER};
use crds::{
    set_condition, ClusterTemplate, Condition, ManagedCluster, ManagedClusterStatus, ServiceRef, Template,
    CONDITION_FALSE, CONDITION_TRUE, FAILED_REASON, HELM_CHART_READY_CONDITION, HELM_RELEASE_READY_CONDITION,
    SUCCEEDED_REASON, TEMPLATE_READY_CONDITION,
};
use fleet_client::{
    artifact_ready, FleetError, HelmChart, ProfileHelmChart, ProfileHelmOptions, ProfileInstallOptions,
    ProfileOptions, ProfileRegistryConfig, ReleaseOptions,
};
use kube_runtime::controller::Action;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::teardown::cluster_kind;
use super::{Reconciler, REQUEUE_INTERVAL};
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    add_finalizer, aggregate_ready, has_finalizer, is_being_deleted, name_and_namespace, owner_reference,
    remove_finalizer, status_needs_update,
};

const READY_MESSAGE: &str = "ManagedCluster is ready";

/// Condition as reported by Cluster API objects
#[derive(Debug, Deserialize)]
struct InfraCondition {
    #[serde(rename = "type")]
    type_: String,
    status: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct InfraStatus {
    #[serde(default)]
    conditions: Option<Vec<InfraCondition>>,
}

fn fail(conditions: &mut Vec<Condition>, type_: &str, message: String) {
    set_condition(conditions, Condition::new(type_, CONDITION_FALSE, FAILED_REASON, message));
}

fn succeed(conditions: &mut Vec<Condition>, type_: &str, message: &str) {
    set_condition(conditions, Condition::new(type_, CONDITION_TRUE, SUCCEEDED_REASON, message));
}

impl Reconciler {
    /// Reconcile a ManagedCluster.
    pub async fn reconcile_managed_cluster(&self, cluster: &ManagedCluster) -> Result<Action, ControllerError> {
        let (name, namespace) = name_and_namespace(&cluster.metadata)?;
        info!("Reconciling ManagedCluster {}/{}", namespace, name);

        if is_being_deleted(&cluster.metadata) {
            return self.delete_managed_cluster(cluster, name, namespace).await;
        }

        if !has_finalizer(&cluster.metadata, MANAGED_CLUSTER_FINALIZER) {
            let mut updated = cluster.clone();
            add_finalizer(&mut updated.metadata, MANAGED_CLUSTER_FINALIZER);
            self.client.update_managed_cluster(&updated).await?;
            info!("Added finalizer to ManagedCluster {}/{}", namespace, name);
            return Ok(Action::await_change());
        }

        let mut status = cluster.status.clone().unwrap_or_default();
        if status.conditions.is_empty() {
            status.init_conditions(cluster.spec.dry_run);
        }
        status.observed_generation = cluster.metadata.generation;

        let result = self.update_cluster(cluster, name, namespace, &mut status).await;

        let ready = aggregate_ready(&status.conditions, READY_MESSAGE);
        set_condition(&mut status.conditions, ready);

        if status_needs_update(cluster.status.as_ref(), &status) {
            let mut updated = cluster.clone();
            updated.status = Some(status);
            self.client.update_managed_cluster_status(&updated).await?;
        } else {
            debug!("ManagedCluster {}/{} status unchanged, skipping update", namespace, name);
        }
        result
    }

    async fn update_cluster(
        &self,
        cluster: &ManagedCluster,
        name: &str,
        namespace: &str,
        status: &mut ManagedClusterStatus,
    ) -> Result<Action, ControllerError> {
        let conditions = &mut status.conditions;
        let system_namespace = self.config.system_namespace.as_str();

        let template = match self.client.get_cluster_template(system_namespace, &cluster.spec.template).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                fail(conditions, TEMPLATE_READY_CONDITION, "provided template is not found".to_string());
                return Err(ControllerError::TemplateNotFound(format!(
                    "{}/{}",
                    system_namespace, cluster.spec.template
                )));
            }
            Err(e) => {
                fail(conditions, TEMPLATE_READY_CONDITION, format!("failed to get provided template: {e}"));
                return Err(e.into());
            }
        };
        if !template.is_valid() {
            let message = "provided template is not marked as valid".to_string();
            fail(conditions, TEMPLATE_READY_CONDITION, message.clone());
            return Err(ControllerError::TemplateInvalid(message));
        }
        succeed(conditions, TEMPLATE_READY_CONDITION, "Template is valid");

        let source = match self.cluster_chart_source(&template).await {
            Ok(source) => source,
            Err(e) => {
                fail(conditions, HELM_CHART_READY_CONDITION, format!("failed to get helm chart source: {e}"));
                return Err(e);
            }
        };
        let artifact = match artifact_ready(&source) {
            Ok(artifact) => artifact,
            Err(e) => {
                fail(conditions, HELM_CHART_READY_CONDITION, format!("failed to get helm chart source: {e}"));
                return Err(ControllerError::ChartNotReady(e.message));
            }
        };

        let chart = match self.charts.download_chart(artifact).await {
            Ok(chart) => chart,
            Err(e) => {
                fail(conditions, HELM_CHART_READY_CONDITION, format!("failed to download helm chart: {e}"));
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .charts
            .dry_run_install(&chart, name, namespace, cluster.spec.config.as_ref())
            .await
        {
            fail(
                conditions,
                HELM_CHART_READY_CONDITION,
                format!("failed to validate template with provided configuration: {e}"),
            );
            return Err(e.into());
        }
        succeed(conditions, HELM_CHART_READY_CONDITION, "Helm chart is valid");

        if cluster.spec.dry_run {
            info!("ManagedCluster {}/{} is a dry run, not installing", namespace, name);
            return Ok(Action::await_change());
        }

        let opts = ReleaseOptions {
            values: cluster.spec.config.clone(),
            chart_ref: template.status.as_ref().and_then(|s| s.chart_ref.clone()),
            owner_reference: Some(owner_reference(cluster)?),
            ..Default::default()
        };
        let release = match self.client.reconcile_helm_release(name, namespace, &opts).await {
            Ok((release, result)) => {
                debug!("HelmRelease {}/{}: {:?}", namespace, name, result);
                release
            }
            Err(e) => {
                fail(conditions, HELM_RELEASE_READY_CONDITION, e.to_string());
                return Err(e.into());
            }
        };
        if let Some(ready) = release.ready_condition() {
            set_condition(
                conditions,
                Condition::new(HELM_RELEASE_READY_CONDITION, &ready.status, &ready.reason, ready.message.clone()),
            );
        }

        let Some(infra_ready) = self.infrastructure_conditions(name, namespace, conditions).await? else {
            debug!("Cluster object for {}/{} not found yet, requeueing", namespace, name);
            return Ok(Action::requeue(REQUEUE_INTERVAL));
        };
        if !release.is_ready() || !infra_ready {
            debug!("ManagedCluster {}/{} is not ready yet, requeueing", namespace, name);
            return Ok(Action::requeue(REQUEUE_INTERVAL));
        }

        self.reconcile_services(cluster, name, namespace).await?;
        Ok(Action::await_change())
    }

    /// HelmChart named by a validated template's status
    async fn cluster_chart_source(&self, template: &ClusterTemplate) -> Result<HelmChart, ControllerError> {
        let chart_ref = template
            .status
            .as_ref()
            .and_then(|s| s.chart_ref.as_ref())
            .ok_or_else(|| ControllerError::InvalidConfig("template status has no chartRef".to_string()))?;
        let chart_namespace = chart_ref.namespace_or(&self.config.system_namespace);
        self.client
            .get_helm_chart(chart_namespace, &chart_ref.name)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("HelmChart {}/{}", chart_namespace, chart_ref.name)).into())
    }

    /// Copy the conditions of the Cluster API `Cluster` created by the release.
    ///
    /// Returns None when the object does not exist yet, otherwise whether it
    /// reports conditions and all of them are True.
    async fn infrastructure_conditions(
        &self,
        name: &str,
        namespace: &str,
        conditions: &mut Vec<Condition>,
    ) -> Result<Option<bool>, ControllerError> {
        let labels = BTreeMap::from([(FLUX_HELM_CHART_NAME_KEY.to_string(), name.to_string())]);
        let objects = self
            .client
            .list_infrastructure(&cluster_kind(), namespace, &labels, Some(1))
            .await?;
        let Some(object) = objects.into_iter().next() else {
            return Ok(None);
        };

        let Some(status) = object.status else {
            debug!("Cluster {}/{} has no status yet", namespace, object.name);
            return Ok(Some(false));
        };
        let infra: InfraStatus = serde_json::from_value(status)
            .map_err(|e| ControllerError::InfraStatus(format!("{}/{}: {}", namespace, object.name, e)))?;
        let infra_conditions = match infra.conditions {
            Some(infra_conditions) if !infra_conditions.is_empty() => infra_conditions,
            _ => {
                debug!("Cluster {}/{} reports no conditions yet", namespace, object.name);
                return Ok(Some(false));
            }
        };

        let mut all_true = true;
        for condition in infra_conditions {
            let reason = if condition.reason.is_empty() && condition.status == CONDITION_TRUE {
                SUCCEEDED_REASON.to_string()
            } else {
                condition.reason
            };
            all_true &= condition.status == CONDITION_TRUE;
            set_condition(
                conditions,
                Condition::new(&condition.type_, &condition.status, &reason, condition.message),
            );
        }
        Ok(Some(all_true))
    }

    /// Reconcile the add-on profile from the services marked for install.
    ///
    /// Every service is resolved before the profile is written: a profile
    /// missing an entry uninstalls that service from the cluster.
    async fn reconcile_services(
        &self,
        cluster: &ManagedCluster,
        name: &str,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        let mut helm_charts = Vec::new();
        let mut errors = Vec::new();
        for service in cluster.spec.services.iter().filter(|s| s.install) {
            match self.profile_chart(service).await {
                Ok(chart) => helm_charts.push(chart),
                Err(e) => {
                    warn!("Service {} of ManagedCluster {}/{}: {}", service.template, namespace, name, e);
                    errors.push(format!("failed to get service {}: {}", service.template, e));
                }
            }
        }
        ControllerError::from_messages(errors)?;

        let opts = ProfileOptions {
            match_labels: BTreeMap::from([
                (FLUX_HELM_CHART_NAMESPACE_KEY.to_string(), namespace.to_string()),
                (FLUX_HELM_CHART_NAME_KEY.to_string(), name.to_string()),
            ]),
            helm_charts,
            owner_reference: Some(owner_reference(cluster)?),
        };
        let (_, result) = self.client.reconcile_profile(name, namespace, &opts).await?;
        debug!("Profile {}/{}: {:?}", namespace, name, result);
        Ok(())
    }

    /// Resolve ServiceTemplate -> HelmChart -> HelmRepository into a profile entry
    async fn profile_chart(&self, service: &ServiceRef) -> Result<ProfileHelmChart, ControllerError> {
        let system_namespace = self.config.system_namespace.as_str();
        let template = self
            .client
            .get_service_template(system_namespace, &service.template)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("ServiceTemplate {}/{}", system_namespace, service.template)))?;
        if !template.is_valid() {
            return Err(ControllerError::TemplateInvalid(format!(
                "ServiceTemplate {}/{} is not marked as valid",
                system_namespace, service.template
            )));
        }

        let chart_ref = template
            .status
            .as_ref()
            .and_then(|s| s.chart_ref.as_ref())
            .ok_or_else(|| ControllerError::InvalidConfig("template status has no chartRef".to_string()))?;
        let chart_namespace = chart_ref.namespace_or(system_namespace);
        let chart = self
            .client
            .get_helm_chart(chart_namespace, &chart_ref.name)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("HelmChart {}/{}", chart_namespace, chart_ref.name)))?;

        let source = &chart.spec.source_ref;
        if source.kind != "HelmRepository" {
            return Err(ControllerError::InvalidConfig(format!(
                "HelmChart {}/{} source kind {} is not supported",
                chart_namespace, chart_ref.name, source.kind
            )));
        }
        let repository = self
            .client
            .get_helm_repository(chart_namespace, &source.name)
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("HelmRepository {}/{}", chart_namespace, source.name)))?;

        let values = service
            .values
            .as_ref()
            .map(|v| serde_yaml::to_string(v).map_err(FleetError::from))
            .transpose()?;

        Ok(ProfileHelmChart {
            repository_url: repository.spec.url.clone(),
            repository_name: source.name.clone(),
            chart_name: chart.spec.chart.clone(),
            chart_version: chart.spec.version.clone().unwrap_or_default(),
            release_name: service.release_name.clone(),
            release_namespace: service
                .release_namespace
                .clone()
                .unwrap_or_else(|| service.release_name.clone()),
            helm_chart_action: "Install".to_string(),
            values,
            options: Some(ProfileHelmOptions {
                install_options: ProfileInstallOptions {
                    create_namespace: service.create_namespace,
                },
            }),
            registry_credentials_config: service.registry_config.as_ref().map(|c| ProfileRegistryConfig {
                plain_http: c.plain_http,
                insecure_skip_tls_verify: c.insecure_skip_tls_verify,
            }),
        })
    }

    /// Deletion: drop the profile, then the release. The finalizer goes once
    /// the release is gone; until then the provider release gate runs every
    /// pass.
    async fn delete_managed_cluster(
        &self,
        cluster: &ManagedCluster,
        name: &str,
        namespace: &str,
    ) -> Result<Action, ControllerError> {
        info!("Deleting ManagedCluster {}/{}", namespace, name);
        self.client.delete_profile(namespace, name).await?;

        if self.client.get_helm_release(namespace, name).await?.is_none() {
            let mut updated = cluster.clone();
            if remove_finalizer(&mut updated.metadata, MANAGED_CLUSTER_FINALIZER) {
                self.client.update_managed_cluster(&updated).await?;
                info!("Removed finalizer from ManagedCluster {}/{}", namespace, name);
            }
            return Ok(Action::await_change());
        }

        self.client.delete_helm_release(namespace, name).await?;

        let providers = match self
            .client
            .get_cluster_template(&self.config.system_namespace, &cluster.spec.template)
            .await?
        {
            Some(template) => template.status.map(|s| s.providers.infrastructure).unwrap_or_default(),
            None => Vec::new(),
        };
        if !self.release_cluster(name, namespace, &providers).await? {
            debug!("ManagedCluster {}/{} still has machines", namespace, name);
        }
        Ok(Action::requeue(REQUEUE_INTERVAL))
    }
}

#[cfg(test)]
#[path = "managed_cluster_test.rs"]
mod managed_cluster_test;
