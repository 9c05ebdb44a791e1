//! Background job queue configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the chat completion queue
pub const CHAT_QUEUE: &str = "chat";
/// Name of the embedding generation queue
pub const EMBEDDING_QUEUE: &str = "embedding";
/// Name of the usage analytics queue
pub const ANALYTICS_QUEUE: &str = "analytics";

/// Background job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    /// Durable job backend endpoint; absence puts the queue manager in
    /// degraded (inline execution) mode for the process lifetime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_endpoint: Option<String>,

    /// Chat completion queue: latency-sensitive, high concurrency, short retry
    #[serde(default = "default_chat_tuning")]
    pub chat: QueueTuning,

    /// Embedding queue: throughput-bound, low concurrency, long timeout
    #[serde(default = "default_embedding_tuning")]
    pub embedding: QueueTuning,

    /// Analytics queue: best-effort, a lost aggregation pass is tolerable
    #[serde(default = "default_analytics_tuning")]
    pub analytics: QueueTuning,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            backend_endpoint: None,
            chat: default_chat_tuning(),
            embedding: default_embedding_tuning(),
            analytics: default_analytics_tuning(),
        }
    }
}

impl QueuesConfig {
    /// Iterate over all configured queues as (name, tuning) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &QueueTuning)> {
        [
            (CHAT_QUEUE, &self.chat),
            (EMBEDDING_QUEUE, &self.embedding),
            (ANALYTICS_QUEUE, &self.analytics),
        ]
        .into_iter()
    }

    /// Look up a queue's tuning by name
    pub fn get(&self, name: &str) -> Option<&QueueTuning> {
        match name {
            CHAT_QUEUE => Some(&self.chat),
            EMBEDDING_QUEUE => Some(&self.embedding),
            ANALYTICS_QUEUE => Some(&self.analytics),
            _ => None,
        }
    }
}

impl Validatable for QueuesConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (name, tuning) in self.iter() {
            tuning.validate().map_err(|e| {
                self.validation_error(format!("queue '{}': {}", name, e))
            })?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "queues"
    }
}

/// Per-queue tuning parameters, fixed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTuning {
    /// Maximum simultaneously-active jobs
    pub concurrency: usize,

    /// Rate limit applied by the queue's consumers
    pub rate_limit: RateLimitConfig,

    /// Retry behavior for failing jobs
    pub retry: RetryConfig,

    /// Hard per-job execution timeout; None is unbounded
    #[serde(with = "crate::domains::utils::serde_duration_ms_option", default)]
    pub timeout: Option<Duration>,

    /// How many terminal-state jobs stay queryable
    pub retention: RetentionConfig,
}

impl Validatable for QueueTuning {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.concurrency, "concurrency", self.domain_name())?;
        validate_positive(self.rate_limit.max, "rate_limit.max", self.domain_name())?;
        validate_positive(
            self.rate_limit.window.as_millis(),
            "rate_limit.window",
            self.domain_name(),
        )?;
        validate_positive(self.retry.max_attempts, "retry.max_attempts", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "queues.tuning"
    }
}

/// Token-bucket rate limit: at most `max` operations per `window`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max: u32,

    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub window: Duration,
}

/// Retry-with-backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempt budget, including the first attempt
    pub max_attempts: u32,

    /// Backoff strategy between attempts
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Initial delay before the first retry
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub initial_delay: Duration,
}

/// Backoff strategy between a failed attempt and its retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay between retries
    Fixed,
    /// delay = initial_delay * 2^(attempt-1)
    #[default]
    Exponential,
}

/// Terminal-state job retention limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Completed jobs kept queryable
    pub keep_completed: usize,
    /// Failed jobs kept queryable
    pub keep_failed: usize,
}

// Default value functions
fn default_chat_tuning() -> QueueTuning {
    QueueTuning {
        concurrency: 25,
        rate_limit: RateLimitConfig {
            max: 100,
            window: Duration::from_secs(1),
        },
        retry: RetryConfig {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            initial_delay: Duration::from_millis(500),
        },
        timeout: Some(Duration::from_secs(30)),
        retention: RetentionConfig {
            keep_completed: 100,
            keep_failed: 500,
        },
    }
}

fn default_embedding_tuning() -> QueueTuning {
    QueueTuning {
        concurrency: 2,
        rate_limit: RateLimitConfig {
            max: 10,
            window: Duration::from_secs(1),
        },
        retry: RetryConfig {
            max_attempts: 2,
            backoff: BackoffKind::Exponential,
            initial_delay: Duration::from_secs(5),
        },
        timeout: Some(Duration::from_secs(120)),
        retention: RetentionConfig {
            keep_completed: 50,
            keep_failed: 200,
        },
    }
}

fn default_analytics_tuning() -> QueueTuning {
    QueueTuning {
        concurrency: 5,
        rate_limit: RateLimitConfig {
            max: 50,
            window: Duration::from_secs(1),
        },
        // Losing one aggregation pass is tolerable; blocking the caller is not
        retry: RetryConfig {
            max_attempts: 1,
            backoff: BackoffKind::Fixed,
            initial_delay: Duration::from_millis(100),
        },
        timeout: Some(Duration::from_secs(60)),
        retention: RetentionConfig {
            keep_completed: 20,
            keep_failed: 100,
        },
    }
}
