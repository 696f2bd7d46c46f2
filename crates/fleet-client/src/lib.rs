//! Fleet collaborator client
//!
//! Everything the fleet controllers read from or write to outside their own
//! reconcile logic: the fleet CRDs, Flux chart sources and releases, the
//! Sveltos add-on profile, Cluster API infrastructure objects and the chart
//! archives themselves.
//!
//! # Example
//!
//! ```no_run
//! use fleet_client::{FleetClient, FleetClientTrait, ReleaseOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FleetClient::new(kube::Client::try_default().await?);
//!
//! // Install cluster-api after the platform release is ready
//! let opts = ReleaseOptions {
//!     depends_on: vec!["fleet".to_string()],
//!     ..Default::default()
//! };
//! let (release, result) = client
//!     .reconcile_helm_release("cluster-api", "fleet-system", &opts)
//!     .await?;
//! println!("{:?}: ready={}", result, release.is_ready());
//! # Ok(())
//! # }
//! ```

pub mod chart;
pub mod client;
pub mod dry_run;
pub mod error;
pub mod loader;
pub mod models;
#[path = "trait.rs"]
pub mod fleet_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use chart::{Chart, ChartMetadata};
pub use client::FleetClient;
pub use error::FleetError;
pub use fleet_trait::{ChartLoader, FleetClientTrait};
pub use loader::HttpChartLoader;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{MockChartLoader, MockFleetClient};
