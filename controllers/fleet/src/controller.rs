//! Main controller implementation.
//!
//! This module contains the `Controller` struct that orchestrates
//! reconciliation and resource watching for the fleet controller.
//!
//! The controller manages:
//! - Management: platform component installation
//! - ClusterTemplate, ServiceTemplate, ProviderTemplate: template validation
//! - ManagedCluster: cluster lifecycle and add-on services
//! - MultiClusterService: watched, not reconciled

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fleet_client::{FleetClient, HttpChartLoader};
use kube::Client;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::FleetConfig;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;

type Task = JoinHandle<Result<(), ControllerError>>;

/// Main controller for fleet resource management.
pub struct Controller {
    management_watcher: Task,
    cluster_template_watcher: Task,
    service_template_watcher: Task,
    provider_template_watcher: Task,
    managed_cluster_watcher: Task,
    multicluster_service_watcher: Task,
    metrics_server: Task,
}

/// Spawn one watcher loop on its own task
fn spawn_watcher<F, Fut>(watcher: &Arc<Watcher>, watch: F) -> Task
where
    F: FnOnce(Arc<Watcher>) -> Fut,
    Fut: Future<Output = Result<(), ControllerError>> + Send + 'static,
{
    tokio::spawn(watch(watcher.clone()))
}

/// Map a finished task to the error that stops the controller
fn task_exit(name: &str, result: Result<Result<(), ControllerError>, tokio::task::JoinError>) -> ControllerError {
    match result {
        Ok(Ok(())) => ControllerError::Watch(format!("{name} exited")),
        Ok(Err(e)) => ControllerError::Watch(format!("{name} error: {e}")),
        Err(e) => ControllerError::Watch(format!("{name} panicked: {e}")),
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: FleetConfig) -> Result<Self, ControllerError> {
        info!("Initializing fleet controller");

        let kube_client = Client::try_default().await?;
        let fleet_client = FleetClient::new(kube_client.clone());
        let chart_loader = HttpChartLoader::new()?;
        let metrics_addr = config.metrics_addr;

        let reconciler = Reconciler::new(fleet_client, chart_loader, config);

        // Make sure the Management singleton exists before the watchers start
        info!("Performing startup reconciliation...");
        if let Err(e) = reconciler.startup_reconciliation().await {
            warn!("Startup reconciliation failed (will continue): {}", e);
        } else {
            info!("Startup reconciliation completed");
        }

        let metrics = Arc::new(Metrics::new()?);
        let ready = Arc::new(AtomicBool::new(false));
        let metrics_server = tokio::spawn(metrics::serve(metrics_addr, metrics.clone(), ready.clone()));

        let watcher = Arc::new(Watcher::new(kube_client, Arc::new(reconciler), metrics));

        let management_watcher =
            spawn_watcher(&watcher, |w| async move { w.watch_management().await });
        let cluster_template_watcher =
            spawn_watcher(&watcher, |w| async move { w.watch_cluster_templates().await });
        let service_template_watcher =
            spawn_watcher(&watcher, |w| async move { w.watch_service_templates().await });
        let provider_template_watcher =
            spawn_watcher(&watcher, |w| async move { w.watch_provider_templates().await });
        let managed_cluster_watcher =
            spawn_watcher(&watcher, |w| async move { w.watch_managed_clusters().await });
        let multicluster_service_watcher =
            spawn_watcher(&watcher, |w| async move { w.watch_multicluster_services().await });

        ready.store(true, Ordering::Relaxed);

        Ok(Self {
            management_watcher,
            cluster_template_watcher,
            service_template_watcher,
            provider_template_watcher,
            managed_cluster_watcher,
            multicluster_service_watcher,
            metrics_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Fleet controller running");

        // Watchers run forever; any of them returning stops the process
        let err = tokio::select! {
            result = &mut self.management_watcher => task_exit("Management watcher", result),
            result = &mut self.cluster_template_watcher => task_exit("ClusterTemplate watcher", result),
            result = &mut self.service_template_watcher => task_exit("ServiceTemplate watcher", result),
            result = &mut self.provider_template_watcher => task_exit("ProviderTemplate watcher", result),
            result = &mut self.managed_cluster_watcher => task_exit("ManagedCluster watcher", result),
            result = &mut self.multicluster_service_watcher => task_exit("MultiClusterService watcher", result),
            result = &mut self.metrics_server => task_exit("Metrics server", result),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        };
        Err(err)
    }
}
