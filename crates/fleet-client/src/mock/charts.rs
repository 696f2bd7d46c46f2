//! Mock chart loader

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::chart::Chart;
use crate::dry_run::simulate_install;
use crate::error::FleetError;
use crate::fleet_trait::ChartLoader;
use crate::models::Artifact;

#[derive(Default)]
struct ChartState {
    charts: BTreeMap<String, Chart>,
    download_errors: BTreeMap<String, String>,
    dry_run_error: Option<String>,
    downloads: Vec<String>,
}

/// Serves charts registered by artifact URL
///
/// Dry runs use the real client-only simulation unless an error is forced.
#[derive(Clone, Default)]
pub struct MockChartLoader {
    state: Arc<Mutex<ChartState>>,
}

impl std::fmt::Debug for MockChartLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChartLoader").finish_non_exhaustive()
    }
}

impl MockChartLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_chart(&self, url: &str, chart: Chart) {
        self.lock().charts.insert(url.to_string(), chart);
    }

    pub fn fail_download(&self, url: &str, message: &str) {
        self.lock().download_errors.insert(url.to_string(), message.to_string());
    }

    pub fn fail_dry_run(&self, message: &str) {
        self.lock().dry_run_error = Some(message.to_string());
    }

    /// URLs downloaded so far
    pub fn downloads(&self) -> Vec<String> {
        self.lock().downloads.clone()
    }
}

#[async_trait]
impl ChartLoader for MockChartLoader {
    async fn download_chart(&self, artifact: &Artifact) -> Result<Chart, FleetError> {
        let mut state = self.lock();
        state.downloads.push(artifact.url.clone());
        if let Some(message) = state.download_errors.get(&artifact.url) {
            return Err(FleetError::InvalidChart(message.clone()));
        }
        state
            .charts
            .get(&artifact.url)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("artifact {}", artifact.url)))
    }

    async fn dry_run_install(
        &self,
        chart: &Chart,
        release_name: &str,
        namespace: &str,
        values: Option<&serde_json::Value>,
    ) -> Result<(), FleetError> {
        if let Some(message) = self.lock().dry_run_error.clone() {
            return Err(FleetError::DryRun(message));
        }
        simulate_install(chart, release_name, namespace, values)
    }
}
