//! Ops HTTP surface served by every worker
//!
//! Deliberately small: liveness and queue stats. Product routes are
//! mounted by the embedding application, not here.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};

use chatforge_queue::{QueueManager, StatsReport};

/// Build the ops router over a shared queue manager
pub fn ops_router(manager: Arc<QueueManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/queues/stats", get(queue_stats))
        .with_state(manager)
}

async fn health() -> Json<JsonValue> {
    Json(json!({"status": "ok"}))
}

async fn queue_stats(State(manager): State<Arc<QueueManager>>) -> Json<StatsReport> {
    Json(manager.stats().await)
}
