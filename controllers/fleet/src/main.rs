//! Fleet Controller
//!
//! Unified controller for the fleet control plane CRDs:
//! - Management: installs the platform, Cluster API and providers
//! - ClusterTemplate / ServiceTemplate / ProviderTemplate: validates charts
//! - ManagedCluster: provisions clusters and their add-on services
//!
//! Configuration comes from environment variables, see `config`.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconcile_helpers;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::FleetConfig;
use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube uses rustls; pick the ring provider before any client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting Fleet Controller");

    let config = FleetConfig::from_env()?;
    info!("Configuration:");
    info!("  System namespace: {}", config.system_namespace);
    info!("  Default registry: {}", config.default_registry_url);
    info!("  Create Management: {}", config.create_management);
    info!("  Metrics address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
