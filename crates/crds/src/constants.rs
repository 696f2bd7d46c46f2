//! Well-known names shared by the fleet controllers
//!
//! Labels, annotations, finalizers and default object names that other
//! components (Flux, Cluster API, Sveltos) join on.

/// Label marking objects created and owned by the control plane
pub const MANAGED_LABEL_KEY: &str = "fleet.microscaler.io/managed";
/// Value of [`MANAGED_LABEL_KEY`]
pub const MANAGED_LABEL_VALUE: &str = "true";

// Singleton installation intent
pub const MANAGEMENT_NAME: &str = "fleet";
pub const MANAGEMENT_FINALIZER: &str = "fleet.microscaler.io/management";

pub const MANAGED_CLUSTER_FINALIZER: &str = "fleet.microscaler.io/managed-cluster";

/// Finalizer placed on provider infrastructure objects by the cluster charts.
/// Blocks removal of the infrastructure object until every machine is gone.
pub const BLOCKING_FINALIZER: &str = "fleet.microscaler.io/cleanup";

// Default core components
pub const DEFAULT_CORE_PLATFORM_TEMPLATE: &str = "fleet";
pub const DEFAULT_CORE_CAPI_TEMPLATE: &str = "cluster-api";

// Provider with a dedicated install namespace
pub const PROVIDER_SVELTOS_NAME: &str = "projectsveltos";
pub const PROVIDER_SVELTOS_TARGET_NAMESPACE: &str = "projectsveltos";
pub const PROVIDER_SVELTOS_CREATE_NAMESPACE: bool = true;

/// Name of the default chart repository generated for templates
pub const DEFAULT_REPOSITORY_NAME: &str = "fleet-templates";

// Chart annotations
pub const CHART_ANNOTATION_TYPE: &str = "fleet.microscaler.io/type";
pub const CHART_ANNOTATION_INFRA_PROVIDERS: &str = "fleet.microscaler.io/infrastructure-providers";
pub const CHART_ANNOTATION_BOOTSTRAP_PROVIDERS: &str = "fleet.microscaler.io/bootstrap-providers";
pub const CHART_ANNOTATION_CONTROL_PLANE_PROVIDERS: &str =
    "fleet.microscaler.io/control-plane-providers";

// Labels set by Flux on every object it renders from a release
pub const FLUX_HELM_CHART_NAME_KEY: &str = "helm.toolkit.fluxcd.io/name";
pub const FLUX_HELM_CHART_NAMESPACE_KEY: &str = "helm.toolkit.fluxcd.io/namespace";

/// Label Cluster API puts on machines belonging to a cluster
pub const CLUSTER_NAME_LABEL_KEY: &str = "cluster.x-k8s.io/cluster-name";
