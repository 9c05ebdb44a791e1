//! Domain-specific configuration modules

pub mod cluster;
pub mod logging;
pub mod queues;
pub mod server;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Chatforge configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChatforgeConfig {
    /// Process clustering configuration
    #[serde(default)]
    pub cluster: cluster::ClusterConfig,

    /// Background job queue configuration
    #[serde(default)]
    pub queues: queues::QueuesConfig,

    /// Worker HTTP server configuration
    #[serde(default)]
    pub server: server::ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl ChatforgeConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.cluster.validate()?;
        self.queues.validate()?;
        self.server.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = ChatforgeConfig::default();
        serde_yaml::to_string(&config).unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ChatforgeConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = ChatforgeConfig::generate_sample();
        let parsed: ChatforgeConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
    }
}
