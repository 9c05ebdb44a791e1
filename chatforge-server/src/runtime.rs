//! Worker runtime: queue consumers plus HTTP serving with bounded drain

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tracing::{info, warn};

use chatforge_config::ChatforgeConfig;
use chatforge_queue::{HandlerError, Job, JobHandler, QueueManager, QueueSpec};
use chatforge_resilience::ShutdownCoordinator;

use crate::error::ServerError;
use crate::routes::ops_router;

/// Wraps the application's handler so every in-flight job is tracked by
/// the drain coordinator
struct DrainTracking {
    inner: Arc<dyn JobHandler>,
    coordinator: Arc<ShutdownCoordinator>,
}

#[async_trait]
impl JobHandler for DrainTracking {
    async fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        let _guard = self.coordinator.begin_work();
        self.inner.handle(job).await
    }
}

/// One full worker: queue manager + consumers + ops HTTP surface.
///
/// Job consumption and request serving run as independent tasks; neither
/// blocks the other. The same runtime serves single-process mode.
pub struct WorkerRuntime {
    config: ChatforgeConfig,
    manager: Arc<QueueManager>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl WorkerRuntime {
    /// Initialize the queue manager (durable or degraded) and install
    /// consumers routed through `handler`
    pub async fn new(config: ChatforgeConfig, handler: Arc<dyn JobHandler>) -> Self {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let tracked = Arc::new(DrainTracking {
            inner: handler,
            coordinator: Arc::clone(&coordinator),
        });

        let specs = QueueSpec::from_config(&config.queues);
        let manager = Arc::new(
            QueueManager::initialize(
                config.queues.backend_endpoint.as_deref(),
                specs,
                tracked,
            )
            .await,
        );

        Self {
            config,
            manager,
            coordinator,
        }
    }

    /// The queue manager request handlers submit through
    pub fn queue_manager(&self) -> Arc<QueueManager> {
        Arc::clone(&self.manager)
    }

    pub fn shutdown_coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Bind the configured ops address
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.server.socket_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serve until `shutdown` resolves, then stop accepting connections,
    /// drain in-flight jobs under the worker deadline, and close the
    /// queue manager. A worker that finishes this path exits cleanly.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "worker serving");
        }

        let app = ops_router(Arc::clone(&self.manager));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.coordinator.request_shutdown();
        let drained = self
            .coordinator
            .drain(self.config.server.drain_deadline)
            .await;
        if !drained {
            warn!(
                in_flight = self.coordinator.in_flight(),
                "drain deadline expired, abandoning in-flight jobs"
            );
        }

        self.manager.shutdown().await;
        info!("worker runtime stopped");
        Ok(())
    }

    /// Bind and serve in one step
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}
