//! Built-in queue handlers
//!
//! Acknowledge-only stand-ins, one per queue. The product layer mounts
//! its real chat, embedding, and analytics processors by building its own
//! `QueueRouter`; a bare `chatforge serve` still drains its queues.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use chatforge_config::domains::queues::{ANALYTICS_QUEUE, CHAT_QUEUE, EMBEDDING_QUEUE};
use chatforge_queue::{HandlerError, Job, JobHandler};
use chatforge_server::QueueRouter;

struct AckHandler {
    queue: &'static str,
}

#[async_trait]
impl JobHandler for AckHandler {
    async fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        debug!(queue = self.queue, job = job.id, attempt = job.attempt, "acknowledging job");
        Ok(json!({ "acknowledged": true, "queue": self.queue }))
    }
}

/// Router with the acknowledge-only handler mounted on every queue
pub fn default_router() -> Arc<QueueRouter> {
    let router = QueueRouter::new()
        .register(CHAT_QUEUE, Arc::new(AckHandler { queue: CHAT_QUEUE }))
        .register(
            EMBEDDING_QUEUE,
            Arc::new(AckHandler {
                queue: EMBEDDING_QUEUE,
            }),
        )
        .register(
            ANALYTICS_QUEUE,
            Arc::new(AckHandler {
                queue: ANALYTICS_QUEUE,
            }),
        );
    Arc::new(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatforge_queue::JobStatus;

    #[tokio::test]
    async fn test_default_router_covers_all_queues() {
        let router = default_router();
        for queue in [CHAT_QUEUE, EMBEDDING_QUEUE, ANALYTICS_QUEUE] {
            let job = Job {
                id: 1,
                queue_name: queue.to_string(),
                payload: json!({}),
                priority: 50,
                attempt: 1,
                status: JobStatus::Active,
                created_at: chrono::Utc::now(),
                result: None,
                error: None,
            };
            let result = router.handle(&job).await.unwrap();
            assert_eq!(result["acknowledged"], json!(true));
        }
    }
}
