//! Worker HTTP server configuration

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a worker waits for in-flight requests and jobs on shutdown.
    /// Kept shorter than the supervisor's deadline so a draining worker
    /// exits intentionally instead of being killed.
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_drain_deadline")]
    pub drain_deadline: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            drain_deadline: default_drain_deadline(),
        }
    }
}

impl ServerConfig {
    /// Socket address string for binding
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.bind_address, "bind_address", self.domain_name())?;
        validate_port_range(self.port, "port", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server"
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_drain_deadline() -> Duration {
    Duration::from_secs(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr(), "0.0.0.0:8090");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.bind_address = String::new();
        assert!(config.validate().is_err());
    }
}
