//! Reconciliation logic for the fleet CRDs.
//!
//! - `template`: ClusterTemplate, ServiceTemplate and ProviderTemplate validation
//! - `management`: platform component installation from the Management singleton
//! - `managed_cluster`: ManagedCluster lifecycle and add-on services
//! - `teardown`: deletion sequencing shared by the two above
//! - `multicluster_service`: MultiClusterService placeholder

pub mod managed_cluster;
pub mod management;
pub mod multicluster_service;
pub mod teardown;
pub mod template;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crds::constants::MANAGEMENT_NAME;
use crds::Management;
use fleet_client::{ChartLoader, FleetClientTrait, FleetError};
use tracing::{info, warn};

use crate::backoff::FibonacciBackoff;
use crate::config::FleetConfig;
use crate::error::ControllerError;

/// Fixed requeue interval for waits (release readiness, teardown gates)
pub const REQUEUE_INTERVAL: Duration = Duration::from_secs(10);

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(5, 300), // 5 seconds min, 5 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles fleet resources.
pub struct Reconciler {
    pub(crate) client: Arc<dyn FleetClientTrait>,
    pub(crate) charts: Arc<dyn ChartLoader>,
    pub(crate) config: FleetConfig,
    /// Error count tracking per resource (kind/namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl FleetClientTrait + 'static,
        charts: impl ChartLoader + 'static,
        config: FleetConfig,
    ) -> Self {
        Self {
            client: Arc::new(client),
            charts: Arc::new(charts),
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Performs startup reconciliation.
    ///
    /// Creates the Management singleton with the default component set when it
    /// is missing and `create_management` is enabled. An existing object is
    /// left untouched.
    pub async fn startup_reconciliation(&self) -> Result<(), ControllerError> {
        if !self.config.create_management {
            info!("Management creation disabled, skipping startup reconciliation");
            return Ok(());
        }
        if self.client.get_management(MANAGEMENT_NAME).await?.is_some() {
            info!("Management {} already exists", MANAGEMENT_NAME);
            return Ok(());
        }

        info!("Creating Management {} with default components", MANAGEMENT_NAME);
        match self.client.create_management(&Management::with_defaults()).await {
            Ok(_) => Ok(()),
            // Created concurrently by another replica
            Err(FleetError::Conflict(e)) => {
                warn!("Management {} was created concurrently: {}", MANAGEMENT_NAME, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get the Fibonacci backoff duration for a resource based on its error count
    ///
    /// Returns (backoff, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_insert_with(BackoffState::new);
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_startup_creates_default_management() {
        let (reconciler, client, _) = create_test_reconciler();

        reconciler.startup_reconciliation().await.unwrap();

        let management = client.management(MANAGEMENT_NAME).expect("management created");
        let core = management.spec.core.expect("core defaults");
        assert_eq!(core.platform.template, "fleet");
        assert_eq!(core.capi.template, "cluster-api");
        assert_eq!(management.spec.providers.len(), 4);

        // Second run leaves the existing object alone
        reconciler.startup_reconciliation().await.unwrap();
        assert_eq!(client.operations(), vec!["create Management fleet"]);
    }

    #[tokio::test]
    async fn test_startup_respects_create_management_flag() {
        let config = FleetConfig {
            create_management: false,
            ..FleetConfig::default()
        };
        let (reconciler, client, _) = create_test_reconciler_with_config(config);

        reconciler.startup_reconciliation().await.unwrap();

        assert!(client.management(MANAGEMENT_NAME).is_none());
    }

    #[test]
    fn test_backoff_tracking_per_resource() {
        let (reconciler, _, _) = create_test_reconciler();

        assert_eq!(reconciler.get_backoff_for_resource("a").0, Duration::from_secs(5));
        assert_eq!(reconciler.get_backoff_for_resource("a").0, Duration::from_secs(5));
        assert_eq!(reconciler.get_backoff_for_resource("a").0, Duration::from_secs(10));
        reconciler.increment_error("a");
        assert_eq!(reconciler.get_backoff_for_resource("a").1, 1);

        // Other resources have their own sequence
        assert_eq!(reconciler.get_backoff_for_resource("b").0, Duration::from_secs(5));

        reconciler.reset_error("a");
        let (backoff, errors) = reconciler.get_backoff_for_resource("a");
        assert_eq!(backoff, Duration::from_secs(5));
        assert_eq!(errors, 0);
    }
}
