//! Controller configuration
//!
//! Read once from the environment at startup.

use std::net::SocketAddr;

use crate::error::ControllerError;

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "fleet-system";
pub const DEFAULT_REGISTRY_URL: &str = "oci://ghcr.io/microscaler/fleet/charts";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Runtime settings of the fleet controller
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    /// Namespace holding the platform releases and the shared templates
    pub system_namespace: String,
    /// Repository backing the generated template charts
    pub default_registry_url: String,
    /// Skip TLS verification for the default repository
    pub default_registry_insecure: bool,
    /// Create the Management singleton at startup when it is missing
    pub create_management: bool,
    /// Bind address of the metrics and probe server
    pub metrics_addr: SocketAddr,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            default_registry_url: DEFAULT_REGISTRY_URL.to_string(),
            default_registry_insecure: false,
            create_management: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl FleetConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let flag = |key: &str, default: bool| -> Result<bool, ControllerError> {
            match lookup(key) {
                None => Ok(default),
                Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" => Ok(true),
                    "0" | "false" | "no" => Ok(false),
                    other => Err(ControllerError::InvalidConfig(format!("{key} must be a boolean, got {other:?}"))),
                },
            }
        };

        let system_namespace = lookup("SYSTEM_NAMESPACE").unwrap_or_else(|| DEFAULT_SYSTEM_NAMESPACE.to_string());
        if system_namespace.is_empty() {
            return Err(ControllerError::InvalidConfig("SYSTEM_NAMESPACE must not be empty".to_string()));
        }
        let metrics_addr = lookup("METRICS_ADDR")
            .unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string())
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("METRICS_ADDR: {e}")))?;

        Ok(Self {
            system_namespace,
            default_registry_url: lookup("DEFAULT_REGISTRY_URL").unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            default_registry_insecure: flag("DEFAULT_REGISTRY_INSECURE", false)?,
            create_management: flag("CREATE_MANAGEMENT", true)?,
            metrics_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = FleetConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FleetConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = FleetConfig::from_lookup(lookup(&[
            ("SYSTEM_NAMESPACE", "platform"),
            ("DEFAULT_REGISTRY_URL", "https://charts.example.com"),
            ("DEFAULT_REGISTRY_INSECURE", "true"),
            ("CREATE_MANAGEMENT", "no"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ]))
        .unwrap();
        assert_eq!(config.system_namespace, "platform");
        assert_eq!(config.default_registry_url, "https://charts.example.com");
        assert!(config.default_registry_insecure);
        assert!(!config.create_management);
        assert_eq!(config.metrics_addr.port(), 9090);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(FleetConfig::from_lookup(lookup(&[("CREATE_MANAGEMENT", "maybe")])).is_err());
        assert!(FleetConfig::from_lookup(lookup(&[("METRICS_ADDR", "nope")])).is_err());
    }
}
