//! HTTP chart loader
//!
//! Downloads chart artifacts from source-controller's artifact server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::chart::{verify_digest, Chart};
use crate::dry_run::simulate_install;
use crate::error::FleetError;
use crate::fleet_trait::ChartLoader;
use crate::models::Artifact;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// [`ChartLoader`] backed by plain HTTP downloads
#[derive(Clone, Debug)]
pub struct HttpChartLoader {
    client: Client,
}

impl HttpChartLoader {
    pub fn new() -> Result<Self, FleetError> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChartLoader for HttpChartLoader {
    async fn download_chart(&self, artifact: &Artifact) -> Result<Chart, FleetError> {
        debug!("Downloading chart artifact {}", artifact.url);
        let bytes = self
            .client
            .get(&artifact.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        verify_digest(&bytes, artifact.digest.as_deref())?;

        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || Chart::from_archive(&bytes))
            .await
            .map_err(|e| FleetError::InvalidChart(format!("chart parsing aborted: {e}")))?
    }

    async fn dry_run_install(
        &self,
        chart: &Chart,
        release_name: &str,
        namespace: &str,
        values: Option<&serde_json::Value>,
    ) -> Result<(), FleetError> {
        simulate_install(chart, release_name, namespace, values)
    }
}
