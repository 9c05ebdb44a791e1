//! Durable job backend boundary

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use chatforge_config::RateLimitConfig;
use chatforge_resilience::RetryPolicy;

use crate::embedded::EmbeddedBackend;
use crate::error::BackendError;
use crate::job::{Job, JobId, QueueCounts};

/// Error type produced by job handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Business-logic collaborator executed by queue consumers.
///
/// The queue layer does not know what the payload means; implementations
/// dispatch on `job.queue_name`. Handlers must tolerate being abandoned
/// mid-execution when the job's hard timeout expires.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError>;
}

/// Per-job options passed through `enqueue`
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub priority: u8,
    pub retry: RetryPolicy,
    /// Hard execution timeout; None is unbounded
    pub timeout: Option<Duration>,
    pub keep_completed: usize,
    pub keep_failed: usize,
}

/// Consumer installation options
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub concurrency: usize,
    pub rate_limit: RateLimitConfig,
}

/// The durable job backend, as this core depends on it.
///
/// Implementations own job state once a job is accepted; the queue
/// manager never caches it. The embedded backend ships in-tree; a
/// networked backend is a collaborator implemented against this trait.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Accept a job into the named queue
    async fn enqueue(
        &self,
        queue: &str,
        payload: JsonValue,
        opts: EnqueueOptions,
    ) -> Result<JobId, BackendError>;

    /// Install consumers for the named queue, honoring concurrency and
    /// rate limit. Returns once the consumers are running.
    async fn consume(
        &self,
        queue: &str,
        opts: ConsumerOptions,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), BackendError>;

    /// Counts by status over the queue's retained jobs
    async fn counts(&self, queue: &str) -> Result<QueueCounts, BackendError>;

    /// Close the backend; consumers stop pulling new jobs
    async fn close(&self) -> Result<(), BackendError>;
}

/// Resolve an endpoint to a backend connection.
///
/// Scheme registry: `mem://` is the embedded in-process backend. Every
/// other scheme is `UnsupportedScheme`, which the queue manager treats
/// the same as an unreachable backend.
pub async fn connect(endpoint: &str) -> Result<Arc<dyn JobBackend>, BackendError> {
    let scheme = endpoint
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| BackendError::InvalidEndpoint(endpoint.to_string()))?;

    match scheme {
        "mem" => Ok(Arc::new(EmbeddedBackend::new())),
        _ => Err(BackendError::UnsupportedScheme(endpoint.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_mem_scheme() {
        assert!(connect("mem://jobs").await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = connect("redis://localhost:6379").await.err().unwrap();
        assert!(matches!(err, BackendError::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_endpoint() {
        let err = connect("not-an-endpoint").await.err().unwrap();
        assert!(matches!(err, BackendError::InvalidEndpoint(_)));
    }
}
