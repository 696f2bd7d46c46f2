//! Fleet client errors

use thiserror::Error;

/// Errors that can occur at the release engine / chart source boundary
#[derive(Debug, Error)]
pub enum FleetError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// HTTP request/response error while fetching an artifact
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error (Chart.yaml, values.yaml)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error while reading a chart archive
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object not found
    #[error("{0} not found")]
    NotFound(String),

    /// Resource version mismatch on write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Chart archive is malformed or fails structural validation
    #[error("{0}")]
    InvalidChart(String),

    /// Client-side install simulation rejected the chart/values
    #[error("{0}")]
    DryRun(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FleetError {
    /// True when the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            FleetError::NotFound(_) => true,
            FleetError::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}
