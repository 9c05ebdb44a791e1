//! Queue manager: the single entry point for job submission
//!
//! The manager decides once, at initialization, whether durable background
//! execution is available. It never throws backend trouble at submitters:
//! a failed or unavailable enqueue degrades to an inline echo that the
//! caller executes synchronously.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::{info, warn};

use chatforge_config::{BackoffKind as ConfigBackoffKind, QueueTuning, QueuesConfig, RateLimitConfig};
use chatforge_resilience::{BackoffKind, RetryPolicy};

use crate::backend::{self, ConsumerOptions, EnqueueOptions, JobBackend, JobHandler};
use crate::error::QueueError;
use crate::events::QueueEvent;
use crate::job::{QueueCounts, SubmissionResult, DEFAULT_PRIORITY};

/// Queue-layer view of one configured queue
#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    pub concurrency: usize,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl QueueSpec {
    /// Build a spec from a configured queue tuning
    pub fn from_tuning(name: &str, tuning: &QueueTuning) -> Self {
        let backoff = match tuning.retry.backoff {
            ConfigBackoffKind::Fixed => BackoffKind::Fixed,
            ConfigBackoffKind::Exponential => BackoffKind::Exponential,
        };

        Self {
            name: name.to_string(),
            concurrency: tuning.concurrency,
            rate_limit: tuning.rate_limit.clone(),
            retry: RetryPolicy {
                max_attempts: tuning.retry.max_attempts,
                backoff,
                initial_delay: tuning.retry.initial_delay,
            },
            timeout: tuning.timeout,
            keep_completed: tuning.retention.keep_completed,
            keep_failed: tuning.retention.keep_failed,
        }
    }

    /// All specs from the queues configuration domain
    pub fn from_config(config: &QueuesConfig) -> Vec<Self> {
        config
            .iter()
            .map(|(name, tuning)| Self::from_tuning(name, tuning))
            .collect()
    }

    fn enqueue_options(&self, priority: u8) -> EnqueueOptions {
        EnqueueOptions {
            priority,
            retry: self.retry.clone(),
            timeout: self.timeout,
            keep_completed: self.keep_completed,
            keep_failed: self.keep_failed,
        }
    }

    fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            concurrency: self.concurrency,
            rate_limit: self.rate_limit.clone(),
        }
    }
}

/// Per-queue stats snapshot, or the reason none is available
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub available: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub queues: Option<HashMap<String, QueueCounts>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsReport {
    fn available(queues: HashMap<String, QueueCounts>) -> Self {
        Self {
            available: true,
            queues: Some(queues),
            error: None,
        }
    }

    fn unavailable(error: Option<String>) -> Self {
        Self {
            available: false,
            queues: None,
            error,
        }
    }
}

enum Mode {
    Durable { backend: Arc<dyn JobBackend> },
    Degraded,
}

/// The single source of truth for whether durable background execution is
/// available, and the sole entry/exit point for job submission
pub struct QueueManager {
    mode: Mode,
    specs: HashMap<String, QueueSpec>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueManager {
    /// Initialize against the configured endpoint.
    ///
    /// No endpoint, a failed connection, or a failed consumer install all
    /// put the manager in degraded mode permanently for this process; it
    /// does not retry mid-session.
    pub async fn initialize(
        endpoint: Option<&str>,
        specs: Vec<QueueSpec>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);

        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                info!("no job backend configured, queue manager running degraded (inline execution)");
                return Self::degraded(specs, events, "no backend endpoint configured");
            }
        };

        let backend = match backend::connect(endpoint).await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(error = %e, "job backend unreachable, queue manager running degraded");
                return Self::degraded(specs, events, &e.to_string());
            }
        };

        let mut install_error = None;
        for spec in &specs {
            if let Err(e) = backend
                .consume(&spec.name, spec.consumer_options(), Arc::clone(&handler))
                .await
            {
                warn!(queue = %spec.name, error = %e, "consumer install failed, queue manager running degraded");
                install_error = Some(e.to_string());
                break;
            }
        }
        if let Some(reason) = install_error {
            return Self::degraded(specs, events, &reason);
        }

        info!(queues = specs.len(), "queue manager connected to durable backend");
        Self {
            mode: Mode::Durable { backend },
            specs: Self::index(specs),
            events,
        }
    }

    /// Build a durable manager over an already-connected backend.
    ///
    /// Dependency-injection seam; consumers are not installed.
    pub fn with_backend(backend: Arc<dyn JobBackend>, specs: Vec<QueueSpec>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            mode: Mode::Durable { backend },
            specs: Self::index(specs),
            events,
        }
    }

    fn degraded(specs: Vec<QueueSpec>, events: broadcast::Sender<QueueEvent>, reason: &str) -> Self {
        let _ = events.send(QueueEvent::Downgraded {
            reason: reason.to_string(),
        });
        Self {
            mode: Mode::Degraded,
            specs: Self::index(specs),
            events,
        }
    }

    fn index(specs: Vec<QueueSpec>) -> HashMap<String, QueueSpec> {
        specs.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    /// Whether the manager fell back to inline execution
    pub fn is_degraded(&self) -> bool {
        matches!(self.mode, Mode::Degraded)
    }

    /// Subscribe to queue observability events
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Submit a job for background execution.
    ///
    /// The only error is an unknown queue name. Backend trouble is not an
    /// error: the caller gets `Inline` back and runs the payload itself.
    pub async fn submit(
        &self,
        queue: &str,
        payload: JsonValue,
        priority: Option<u8>,
    ) -> Result<SubmissionResult, QueueError> {
        let spec = self
            .specs
            .get(queue)
            .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?;

        let backend = match &self.mode {
            Mode::Degraded => return Ok(SubmissionResult::Inline { payload }),
            Mode::Durable { backend } => backend,
        };

        let priority = priority.unwrap_or(DEFAULT_PRIORITY);
        match backend
            .enqueue(queue, payload.clone(), spec.enqueue_options(priority))
            .await
        {
            Ok(job_id) => Ok(SubmissionResult::Queued { job_id }),
            Err(e) => {
                warn!(queue, error = %e, "enqueue failed, falling back to inline execution");
                let _ = self.events.send(QueueEvent::SubmitFailed {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                });
                Ok(SubmissionResult::Inline { payload })
            }
        }
    }

    /// Per-queue counts by status. Never errors; backend query failures
    /// are reported inside the report.
    pub async fn stats(&self) -> StatsReport {
        let backend = match &self.mode {
            Mode::Degraded => return StatsReport::unavailable(None),
            Mode::Durable { backend } => backend,
        };

        let mut queues = HashMap::new();
        for name in self.specs.keys() {
            match backend.counts(name).await {
                Ok(counts) => {
                    queues.insert(name.clone(), counts);
                }
                Err(e) => return StatsReport::unavailable(Some(e.to_string())),
            }
        }
        StatsReport::available(queues)
    }

    /// Close the backend connection. Best-effort: close errors are logged
    /// and swallowed so shutdown always proceeds.
    pub async fn shutdown(&self) {
        if let Mode::Durable { backend } = &self.mode {
            if let Err(e) = backend.close().await {
                warn!(error = %e, "job backend close failed during shutdown");
            }
        }
    }
}
