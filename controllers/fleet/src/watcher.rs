//! Kubernetes resource watchers.
//!
//! This module handles watching Kubernetes resources for changes
//! and triggering reconciliation using kube_runtime::Controller.
//!
//! All watchers share a generic `run_controller()` helper. Secondary
//! watches re-trigger the owning object:
//! - template kinds own their generated HelmChart
//! - ManagedCluster owns its HelmRelease
//! - every ProviderTemplate change re-triggers the Management singleton

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crds::constants::MANAGEMENT_NAME;
use crds::{ClusterTemplate, ManagedCluster, Management, MultiClusterService, ProviderTemplate, ServiceTemplate};
use fleet_client::{HelmChart, HelmRelease};
use futures::StreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>>;

/// Backoff key of an object: `Kind/namespace/name`, or `Kind/name` when cluster-scoped
fn resource_key<K: Resource>(resource_name: &str, obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(namespace) => format!("{}/{}/{}", resource_name, namespace, obj.name_any()),
        None => format!("{}/{}", resource_name, obj.name_any()),
    }
}

/// Drive a configured kube_runtime::Controller until its stream ends.
///
/// Errors requeue with the per-object Fibonacci backoff kept by the
/// reconciler; a successful pass resets it.
async fn run_controller<K, F>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<Metrics>,
    reconcile_fn: F,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + Debug + DeserializeOwned + 'static,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = resource_key(resource_name, obj.as_ref());
        ctx.increment_error(&key);
        let (backoff, error_count) = ctx.get_backoff_for_resource(&key);
        warn!(
            "Reconciliation of {} failed ({} consecutive errors), retrying in {:?}: {}",
            key, error_count, backoff, error
        );
        Action::requeue(backoff)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let metrics = metrics.clone();
        async move {
            let key = resource_key(resource_name, obj.as_ref());
            debug!("Reconciling {}", key);

            let started = Instant::now();
            let result = reconcile_fn(ctx.clone(), obj).await;
            metrics.observe(resource_name, result.is_ok(), started.elapsed());

            match result {
                Ok(action) => {
                    ctx.reset_error(&key);
                    Ok(action)
                }
                Err(e) => {
                    error!("Reconciliation failed for {}: {}", key, e);
                    Err(e)
                }
            }
        }
    };

    // Debounce batches bursts of events (status writes of owned objects)
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    controller
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches fleet resources for changes.
pub struct Watcher {
    client: Client,
    reconciler: Arc<Reconciler>,
    metrics: Arc<Metrics>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(client: Client, reconciler: Arc<Reconciler>, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            reconciler,
            metrics,
        }
    }

    fn controller<K>(&self) -> Controller<K>
    where
        K: Resource<DynamicType = ()> + Clone + Send + Sync + Debug + DeserializeOwned + 'static,
    {
        Controller::new(Api::<K>::all(self.client.clone()), watcher::Config::default())
    }

    /// Starts watching the Management singleton and the ProviderTemplates it installs.
    pub async fn watch_management(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<Management>().watches(
            Api::<ProviderTemplate>::all(self.client.clone()),
            watcher::Config::default(),
            |_| Some(ObjectRef::new(MANAGEMENT_NAME)),
        );
        run_controller(
            controller,
            self.reconciler.clone(),
            self.metrics.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_management(&resource).await }),
            "Management",
        )
        .await
    }

    /// Starts watching ClusterTemplate resources.
    pub async fn watch_cluster_templates(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<ClusterTemplate>()
            .owns(Api::<HelmChart>::all(self.client.clone()), watcher::Config::default());
        run_controller(
            controller,
            self.reconciler.clone(),
            self.metrics.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_template(&*resource).await }),
            "ClusterTemplate",
        )
        .await
    }

    /// Starts watching ServiceTemplate resources.
    pub async fn watch_service_templates(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<ServiceTemplate>()
            .owns(Api::<HelmChart>::all(self.client.clone()), watcher::Config::default());
        run_controller(
            controller,
            self.reconciler.clone(),
            self.metrics.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_template(&*resource).await }),
            "ServiceTemplate",
        )
        .await
    }

    /// Starts watching ProviderTemplate resources.
    pub async fn watch_provider_templates(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<ProviderTemplate>()
            .owns(Api::<HelmChart>::all(self.client.clone()), watcher::Config::default());
        run_controller(
            controller,
            self.reconciler.clone(),
            self.metrics.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_template(&*resource).await }),
            "ProviderTemplate",
        )
        .await
    }

    /// Starts watching ManagedCluster resources and their releases.
    pub async fn watch_managed_clusters(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<ManagedCluster>()
            .owns(Api::<HelmRelease>::all(self.client.clone()), watcher::Config::default());
        run_controller(
            controller,
            self.reconciler.clone(),
            self.metrics.clone(),
            |reconciler, resource| Box::pin(async move { reconciler.reconcile_managed_cluster(&resource).await }),
            "ManagedCluster",
        )
        .await
    }

    /// Starts watching MultiClusterService resources.
    pub async fn watch_multicluster_services(&self) -> Result<(), ControllerError> {
        run_controller(
            self.controller::<MultiClusterService>(),
            self.reconciler.clone(),
            self.metrics.clone(),
            |reconciler, resource| {
                Box::pin(async move { reconciler.reconcile_multicluster_service(&resource).await })
            },
            "MultiClusterService",
        )
        .await
    }
}
