//! Controller-specific error types.
//!
//! This module defines error types specific to the fleet controller
//! that are not covered by upstream library errors.

use fleet_client::FleetError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the fleet controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Release engine / chart source error
    #[error(transparent)]
    Fleet(#[from] FleetError),

    /// Referenced template does not exist
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Template failed validation; the message is also in its status
    #[error("{0}")]
    TemplateInvalid(String),

    /// Chart artifact not produced yet
    #[error("{0}")]
    ChartNotReady(String),

    /// The certificate-issuing API is required by the platform component
    #[error("failed to find the cert-manager API ({0}); it must be installed before the platform")]
    CertManagerMissing(String),

    /// Cluster API object reported a status that does not decode
    #[error("invalid status of Cluster {0}")]
    InfraStatus(String),

    /// Several independent failures from one reconcile pass
    #[error("{}", .0.join("; "))]
    Aggregate(Vec<String>),

    /// Object is missing a required metadata field
    #[error("object is missing metadata.{0}")]
    MissingMetadata(&'static str),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics server I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Collapse a list of failure messages into a result
    pub fn from_messages(messages: Vec<String>) -> Result<(), ControllerError> {
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::Aggregate(messages))
        }
    }
}
