//! Template validation
//!
//! Shared by ClusterTemplate, ServiceTemplate and ProviderTemplate through the
//! [`Template`] trait. A pass resolves the chart source, waits for its
//! artifact, downloads and checks the chart and records the outcome in the
//! template status.

use crds::constants::{CHART_ANNOTATION_TYPE, DEFAULT_REPOSITORY_NAME};
use crds::{ChartReference, Providers, Template, TemplateStatus, TemplateType};
use fleet_client::{
    artifact_ready, managed_labels, FleetError, HelmChart, HelmRepository, HelmRepositorySpec,
    DEFAULT_RECONCILE_INTERVAL,
};
use kube::api::ObjectMeta;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{name_and_namespace, owner_reference, status_needs_update};

/// Why a validation pass stopped
enum Outcome {
    /// Recorded in the status as `valid=false`
    Invalid(String),
    /// Retried without touching the status
    Retry(ControllerError),
}

impl From<ControllerError> for Outcome {
    fn from(e: ControllerError) -> Self {
        Outcome::Retry(e)
    }
}

impl From<FleetError> for Outcome {
    fn from(e: FleetError) -> Self {
        Outcome::Retry(e.into())
    }
}

impl Reconciler {
    /// Reconcile any of the three template kinds.
    pub async fn reconcile_template<T: Template>(&self, template: &T) -> Result<Action, ControllerError> {
        let (name, namespace) = name_and_namespace(template.meta())?;
        let kind = T::KIND.kind_name();
        info!("Reconciling {} {}/{}", kind, namespace, name);

        let mut status = TemplateStatus {
            observed_generation: template.meta().generation,
            ..Default::default()
        };
        let outcome = self.validate_template(template, name, namespace, &mut status).await;

        let result = match outcome {
            Ok(()) => {
                status.valid = true;
                info!("{} {}/{} is valid", kind, namespace, name);
                Ok(Action::await_change())
            }
            Err(Outcome::Invalid(message)) => {
                warn!("{} {}/{} is invalid: {}", kind, namespace, name, message);
                status.valid = false;
                status.validation_error = Some(message.clone());
                Err(ControllerError::TemplateInvalid(message))
            }
            Err(Outcome::Retry(e)) => return Err(e),
        };

        if status_needs_update(template.status(), &status) {
            self.client
                .update_template_status(
                    T::KIND,
                    namespace,
                    name,
                    template.meta().resource_version.as_deref(),
                    &status,
                )
                .await?;
        } else {
            debug!("{} {}/{} status unchanged, skipping update", kind, namespace, name);
        }
        result
    }

    async fn validate_template<T: Template>(
        &self,
        template: &T,
        name: &str,
        namespace: &str,
        status: &mut TemplateStatus,
    ) -> Result<(), Outcome> {
        let chart_source = self.template_chart_source(template, name, namespace).await?;
        status.chart_ref = Some(ChartReference::helm_chart(
            chart_source.metadata.name.clone().unwrap_or_default(),
            chart_source.metadata.namespace.clone().unwrap_or_else(|| namespace.to_string()),
        ));

        let artifact = match artifact_ready(&chart_source) {
            Ok(artifact) => artifact,
            Err(e) if e.report_status => return Err(Outcome::Invalid(e.message)),
            Err(e) => return Err(Outcome::Retry(ControllerError::ChartNotReady(e.message))),
        };

        let chart = self
            .charts
            .download_chart(artifact)
            .await
            .map_err(|e| Outcome::Invalid(format!("failed to download chart: {e}")))?;

        let spec = template.spec();
        status.providers = match &spec.providers {
            Some(providers) => providers.clone(),
            None => Providers::from_annotations(&chart.metadata.annotations),
        };

        // An untyped template with an unannotated chart parses "" and is rejected
        let template_type = match spec.template_type {
            Some(template_type) => template_type,
            None => TemplateType::parse(
                chart
                    .metadata
                    .annotations
                    .get(CHART_ANNOTATION_TYPE)
                    .map_or("", String::as_str),
            )
            .map_err(Outcome::Invalid)?,
        };
        debug!("{}/{} has template type {}", namespace, name, template_type.as_str());

        chart.validate().map_err(|e| Outcome::Invalid(e.to_string()))?;

        status.config = Some(chart.values.clone());
        status.description = chart.metadata.description.clone();
        Ok(())
    }

    /// Resolve the HelmChart a template points at, generating it when the
    /// template only names a chart.
    async fn template_chart_source<T: Template>(
        &self,
        template: &T,
        name: &str,
        namespace: &str,
    ) -> Result<HelmChart, Outcome> {
        let helm = &template.spec().helm;

        if let Some(chart_ref) = &helm.chart_ref {
            if chart_ref.kind != "HelmChart" {
                return Err(Outcome::Invalid(format!(
                    "invalid chartRef.Kind: {}. Only HelmChart kind is supported",
                    chart_ref.kind
                )));
            }
            let chart_namespace = chart_ref.namespace_or(namespace);
            return self
                .client
                .get_helm_chart(chart_namespace, &chart_ref.name)
                .await?
                .ok_or_else(|| {
                    Outcome::Invalid(format!("HelmChart {}/{} not found", chart_namespace, chart_ref.name))
                });
        }

        let Some(chart_name) = helm.chart_name.as_deref() else {
            return Err(Outcome::Invalid("neither chartName nor chartRef is set".to_string()));
        };

        if namespace == self.config.system_namespace || !template.is_managed() {
            self.ensure_default_repository(namespace).await?;
        }

        let desired = HelmChart::generated(
            name,
            namespace,
            chart_name,
            helm.chart_version.as_deref(),
            DEFAULT_REPOSITORY_NAME,
            Some(owner_reference(template)?),
        );
        Ok(self.client.apply_helm_chart(&desired).await?)
    }

    /// Create or update the default template repository in `namespace`
    pub(crate) async fn ensure_default_repository(&self, namespace: &str) -> Result<(), ControllerError> {
        let url = &self.config.default_registry_url;
        let repository = HelmRepository {
            metadata: ObjectMeta {
                name: Some(DEFAULT_REPOSITORY_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                ..Default::default()
            },
            spec: HelmRepositorySpec {
                url: url.clone(),
                repository_type: url.starts_with("oci://").then(|| "oci".to_string()),
                insecure: self.config.default_registry_insecure.then_some(true),
                interval: Some(DEFAULT_RECONCILE_INTERVAL.to_string()),
            },
            status: None,
        };
        self.client.apply_helm_repository(&repository).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "template_test.rs"]
mod template_test;
