//! Configuration loading and environment variable handling

use crate::domains::ChatforgeConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "CHATFORGE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<ChatforgeConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ChatforgeConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<ChatforgeConfig> {
        let mut config = ChatforgeConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<ChatforgeConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut ChatforgeConfig) -> ConfigResult<()> {
        self.apply_cluster_overrides(&mut config.cluster)?;
        self.apply_queues_overrides(&mut config.queues)?;
        self.apply_server_overrides(&mut config.server)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply cluster config overrides
    fn apply_cluster_overrides(
        &self,
        config: &mut crate::domains::cluster::ClusterConfig,
    ) -> ConfigResult<()> {
        if let Ok(enabled) = self.get_env_var("CLUSTER_ENABLED") {
            config.enabled = enabled
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid CLUSTER_ENABLED: {}", e)))?;
        }

        if let Ok(max_workers) = self.get_env_var("MAX_WORKERS") {
            config.max_workers = max_workers
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_WORKERS: {}", e)))?;
        }

        if let Ok(deadline) = self.get_env_var("SHUTDOWN_DEADLINE_SECONDS") {
            let seconds: u64 = deadline.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid SHUTDOWN_DEADLINE_SECONDS: {}", e))
            })?;
            config.shutdown_deadline = std::time::Duration::from_secs(seconds);
        }

        Ok(())
    }

    /// Apply queue config overrides
    fn apply_queues_overrides(
        &self,
        config: &mut crate::domains::queues::QueuesConfig,
    ) -> ConfigResult<()> {
        if let Ok(endpoint) = self.get_env_var("JOB_BACKEND") {
            // An explicitly empty value clears a file-configured endpoint
            config.backend_endpoint = if endpoint.is_empty() {
                None
            } else {
                Some(endpoint)
            };
        }

        Ok(())
    }

    /// Apply server config overrides
    fn apply_server_overrides(
        &self,
        config: &mut crate::domains::server::ServerConfig,
    ) -> ConfigResult<()> {
        if let Ok(bind) = self.get_env_var("BIND_ADDRESS") {
            config.bind_address = bind;
        }

        if let Ok(port) = self.get_env_var("PORT") {
            config.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid PORT: {}", e)))?;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            use std::str::FromStr;
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "cluster:\n  enabled: true\n  max_workers: 2\nqueues:\n  backend_endpoint: mem://jobs\n"
        )
        .unwrap();

        let loader = ConfigLoader::with_prefix("CHATFORGE_TEST_UNSET");
        let config = loader.from_file(file.path()).unwrap();
        assert!(config.cluster.enabled);
        assert_eq!(config.cluster.max_workers, 2);
        assert_eq!(config.queues.backend_endpoint.as_deref(), Some("mem://jobs"));
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        temp_env::with_vars(
            [
                ("CF_ENVTEST_CLUSTER_ENABLED", Some("true")),
                ("CF_ENVTEST_MAX_WORKERS", Some("7")),
                ("CF_ENVTEST_JOB_BACKEND", Some("mem://override")),
                ("CF_ENVTEST_PORT", Some("9191")),
            ],
            || {
                let loader = ConfigLoader::with_prefix("CF_ENVTEST");
                let config = loader.from_env().unwrap();
                assert!(config.cluster.enabled);
                assert_eq!(config.cluster.max_workers, 7);
                assert_eq!(config.queues.backend_endpoint.as_deref(), Some("mem://override"));
                assert_eq!(config.server.port, 9191);
            },
        );
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        temp_env::with_vars([("CF_BADENV_MAX_WORKERS", Some("many"))], || {
            let loader = ConfigLoader::with_prefix("CF_BADENV");
            assert!(loader.from_env().is_err());
        });
    }

    #[test]
    fn test_empty_backend_env_clears_endpoint() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "queues:\n  backend_endpoint: mem://jobs\n").unwrap();

        temp_env::with_vars([("CF_CLEAR_JOB_BACKEND", Some(""))], || {
            let loader = ConfigLoader::with_prefix("CF_CLEAR");
            let config = loader.from_file(file.path()).unwrap();
            assert!(config.queues.backend_endpoint.is_none());
        });
    }
}
