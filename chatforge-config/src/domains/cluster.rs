//! Process clustering configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process clustering configuration
///
/// When `enabled` is false the process runs as a single worker with no
/// supervisor; that is a first-class deployment mode, not a fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Whether to fork and supervise worker processes
    #[serde(default = "crate::domains::utils::default_false")]
    pub enabled: bool,

    /// Target worker count; clamped to available CPU parallelism at startup
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Interval between supervisor health checks
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_health_check_interval")]
    pub health_check_interval: Duration,

    /// Hard deadline for graceful shutdown before the process group is killed
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_shutdown_deadline")]
    pub shutdown_deadline: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_workers: default_max_workers(),
            health_check_interval: default_health_check_interval(),
            shutdown_deadline: default_shutdown_deadline(),
        }
    }
}

impl Validatable for ClusterConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_workers, "max_workers", self.domain_name())?;
        validate_positive(
            self.health_check_interval.as_secs(),
            "health_check_interval",
            self.domain_name(),
        )?;
        validate_positive(
            self.shutdown_deadline.as_secs(),
            "shutdown_deadline",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "cluster"
    }
}

// Default value functions
fn default_max_workers() -> usize {
    4
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_deadline() -> Duration {
    Duration::from_secs(10)
}
