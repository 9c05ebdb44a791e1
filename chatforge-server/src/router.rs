//! Per-queue handler dispatch
//!
//! The queue layer executes one handler per job; this router owns the
//! mapping from queue name to the business-logic handler the embedding
//! application registered. The queue layer stays ignorant of what the
//! payloads mean.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use chatforge_queue::{HandlerError, Job, JobHandler};

/// Dispatches jobs to the handler registered for their queue
#[derive(Default)]
pub struct QueueRouter {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl QueueRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for one queue
    pub fn register(mut self, queue: &str, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(queue.to_string(), handler);
        self
    }
}

#[async_trait]
impl JobHandler for QueueRouter {
    async fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        match self.handlers.get(&job.queue_name) {
            Some(handler) => handler.handle(job).await,
            None => Err(format!("no handler registered for queue '{}'", job.queue_name).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatforge_queue::JobStatus;
    use chrono::Utc;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
            Ok(job.payload.clone())
        }
    }

    fn job_for(queue: &str) -> Job {
        Job {
            id: 1,
            queue_name: queue.to_string(),
            payload: json!({"msg": "hi"}),
            priority: 50,
            attempt: 1,
            status: JobStatus::Active,
            created_at: Utc::now(),
            result: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_queue_name() {
        let router = QueueRouter::new().register("chat", Arc::new(EchoHandler));
        let result = router.handle(&job_for("chat")).await.unwrap();
        assert_eq!(result, json!({"msg": "hi"}));
    }

    #[tokio::test]
    async fn test_unregistered_queue_fails() {
        let router = QueueRouter::new();
        let err = router.handle(&job_for("analytics")).await.unwrap_err();
        assert!(err.to_string().contains("analytics"));
    }
}
