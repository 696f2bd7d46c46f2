//! Management reconciliation
//!
//! Installs the platform from the Management singleton: the fleet platform,
//! then Cluster API core, then every provider. Each component is one release
//! of a validated ProviderTemplate in the system namespace. Failures are
//! isolated per component and reported together at the end of the pass.

use crds::constants::{
    MANAGEMENT_FINALIZER, MANAGEMENT_NAME, PROVIDER_SVELTOS_CREATE_NAMESPACE, PROVIDER_SVELTOS_NAME,
    PROVIDER_SVELTOS_TARGET_NAMESPACE,
};
use crds::{ComponentStatus, Management, ManagementSpec, ManagementStatus, Providers, Template};
use fleet_client::ReleaseOptions;
use kube_runtime::controller::Action;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{add_finalizer, is_being_deleted, status_needs_update};

/// API required by the platform's admission webhook
pub const CERT_MANAGER_API: &str = "cert-manager.io/v1";

/// A component ready to be installed, with its place in the install order
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedComponent {
    pub template: String,
    pub config: Option<Value>,
    pub depends_on: Option<String>,
    pub target_namespace: Option<String>,
    pub create_namespace: bool,
    /// Set when the component's config cannot be prepared; the component fails
    pub config_error: Option<String>,
}

impl WrappedComponent {
    fn new(template: &str, config: Option<Value>, depends_on: Option<&str>) -> Self {
        let sveltos = template == PROVIDER_SVELTOS_NAME;
        Self {
            template: template.to_string(),
            config,
            depends_on: depends_on.map(String::from),
            target_namespace: sveltos.then(|| PROVIDER_SVELTOS_TARGET_NAMESPACE.to_string()),
            create_namespace: sveltos && PROVIDER_SVELTOS_CREATE_NAMESPACE,
            config_error: None,
        }
    }
}

/// Order the components: platform, then capi depending on it, then every
/// provider depending on capi.
pub fn wrapped_components(spec: &ManagementSpec) -> Vec<WrappedComponent> {
    let Some(core) = &spec.core else {
        return Vec::new();
    };

    let platform = match with_cert_manager_values(core.platform.config.as_ref()) {
        Ok(values) => WrappedComponent::new(&core.platform.template, Some(values), None),
        Err(e) => WrappedComponent {
            config_error: Some(e.to_string()),
            ..WrappedComponent::new(&core.platform.template, core.platform.config.clone(), None)
        },
    };

    let mut components = vec![
        platform,
        WrappedComponent::new(&core.capi.template, core.capi.config.clone(), Some(core.platform.template.as_str())),
    ];
    components.extend(
        spec.providers
            .iter()
            .map(|p| WrappedComponent::new(&p.template, p.config.clone(), Some(core.capi.template.as_str()))),
    );
    components
}

/// Force `admissionWebhook.enabled=true` and default
/// `cluster-api-operator.enabled` to true unless explicitly disabled.
/// A config that is not an object is rejected rather than dropped.
pub fn with_cert_manager_values(config: Option<&Value>) -> Result<Value, ControllerError> {
    let mut values = match config {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            return Err(ControllerError::InvalidConfig(format!(
                "platform config must be an object, got {other}"
            )));
        }
    };

    let webhook = values
        .entry("admissionWebhook")
        .or_insert_with(|| Value::Object(Map::new()));
    match webhook {
        Value::Object(obj) => {
            obj.insert("enabled".to_string(), Value::Bool(true));
        }
        other => *other = json!({"enabled": true}),
    }

    let operator = values
        .entry("cluster-api-operator")
        .or_insert_with(|| Value::Object(Map::new()));
    match operator {
        Value::Object(obj) => {
            if obj.get("enabled") != Some(&Value::Bool(false)) {
                obj.insert("enabled".to_string(), Value::Bool(true));
            }
        }
        other => *other = json!({"enabled": true}),
    }

    Ok(Value::Object(values))
}

impl Reconciler {
    /// Reconcile the Management singleton.
    pub async fn reconcile_management(&self, management: &Management) -> Result<Action, ControllerError> {
        let name = management
            .metadata
            .name
            .as_deref()
            .ok_or(ControllerError::MissingMetadata("name"))?;
        if name != MANAGEMENT_NAME {
            warn!("Ignoring Management {}: only {} is reconciled", name, MANAGEMENT_NAME);
            return Ok(Action::await_change());
        }
        info!("Reconciling Management {}", name);

        if is_being_deleted(&management.metadata) {
            return self.teardown_platform(management).await;
        }

        let mut updated = management.clone();
        let finalizer_added = add_finalizer(&mut updated.metadata, MANAGEMENT_FINALIZER);
        let defaults_set = updated.spec.set_defaults();
        if finalizer_added || defaults_set {
            info!("Updating Management {} (finalizer: {}, defaults: {})", name, finalizer_added, defaults_set);
            self.client.update_management(&updated).await?;
            return Ok(Action::await_change());
        }

        if !self.client.api_available(CERT_MANAGER_API).await? {
            return Err(ControllerError::CertManagerMissing(CERT_MANAGER_API.to_string()));
        }

        let mut status = ManagementStatus {
            observed_generation: management.metadata.generation,
            ..Default::default()
        };
        let mut errors = Vec::new();
        for component in wrapped_components(&management.spec) {
            match self.reconcile_component(&component).await {
                Ok(providers) => {
                    status.available_providers.extend(&providers);
                    status.components.insert(
                        component.template,
                        ComponentStatus {
                            success: true,
                            error: None,
                        },
                    );
                }
                Err(message) => {
                    warn!("Component {} failed: {}", component.template, message);
                    errors.push(message.clone());
                    status.components.insert(
                        component.template,
                        ComponentStatus {
                            success: false,
                            error: Some(message),
                        },
                    );
                }
            }
        }

        if status_needs_update(management.status.as_ref(), &status) {
            let mut updated = management.clone();
            updated.status = Some(status);
            self.client.update_management_status(&updated).await?;
        } else {
            debug!("Management {} status unchanged, skipping update", name);
        }

        ControllerError::from_messages(errors)?;
        Ok(Action::await_change())
    }

    /// Install one component. Returns the providers its template brings, or
    /// the failure message recorded for the component.
    async fn reconcile_component(&self, component: &WrappedComponent) -> Result<Providers, String> {
        if let Some(message) = &component.config_error {
            return Err(message.clone());
        }
        let namespace = &self.config.system_namespace;
        let template = match self.client.get_provider_template(namespace, &component.template).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                return Err(format!(
                    "Failed to get Template {}/{}: ProviderTemplate {}/{} not found",
                    namespace, component.template, namespace, component.template
                ));
            }
            Err(e) => return Err(format!("Failed to get Template {}/{}: {}", namespace, component.template, e)),
        };
        if !template.is_valid() {
            return Err(format!("Template {}/{} is not marked as valid", namespace, component.template));
        }
        let status = template.status.unwrap_or_default();

        let opts = ReleaseOptions {
            values: component.config.clone(),
            chart_ref: status.chart_ref,
            depends_on: component.depends_on.iter().cloned().collect(),
            target_namespace: component.target_namespace.clone(),
            create_namespace: component.create_namespace,
            owner_reference: None,
        };
        let (_, result) = self
            .client
            .reconcile_helm_release(&component.template, namespace, &opts)
            .await
            .map_err(|e| format!("error reconciling HelmRelease {}/{}: {}", namespace, component.template, e))?;
        debug!("HelmRelease {}/{}: {:?}", namespace, component.template, result);

        Ok(status.providers)
    }
}

#[cfg(test)]
#[path = "management_test.rs"]
mod management_test;
