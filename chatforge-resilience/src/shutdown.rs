//! Graceful shutdown coordination
//!
//! Tracks in-flight work and broadcasts shutdown intent so that consumers
//! and request handlers can stop pulling new work while existing work
//! drains, bounded by a deadline.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Graceful shutdown coordinator
///
/// Single instance per worker, shared by the HTTP surface and every queue
/// consumer. Cloneable handle semantics come from wrapping in `Arc` at the
/// call site.
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    shutting_down: AtomicBool,
    in_flight: Arc<AtomicU32>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender,
            shutting_down: AtomicBool::new(false),
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Subscribe to the shutdown notification
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Record a unit of in-flight work; the guard releases it on drop
    pub fn begin_work(&self) -> WorkGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Current in-flight work count
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Broadcast shutdown intent; idempotent
    pub fn request_shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("shutdown requested, notifying subscribers");
        // Send fails only when nobody subscribed, which is fine
        let _ = self.sender.send(());
    }

    /// Wait for in-flight work to finish, up to `deadline`.
    ///
    /// Returns true when everything drained, false when the deadline
    /// expired with work still running.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();

        while start.elapsed() < deadline {
            if self.in_flight() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let remaining = self.in_flight();
        if remaining > 0 {
            warn!(remaining, "drain deadline expired with work in flight");
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one unit of in-flight work
pub struct WorkGuard {
    in_flight: Arc<AtomicU32>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_work_guard_counts() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.in_flight(), 0);

        let g1 = coordinator.begin_work();
        let g2 = coordinator.begin_work();
        assert_eq!(coordinator.in_flight(), 2);

        drop(g1);
        assert_eq!(coordinator.in_flight(), 1);
        drop(g2);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_request_shutdown_notifies_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(!coordinator.is_shutting_down());
        coordinator.request_shutdown();
        assert!(coordinator.is_shutting_down());
        rx.recv().await.unwrap();

        // Idempotent: a second request does not panic or re-send
        coordinator.request_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_returns_when_work_finishes() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let guard = coordinator.begin_work();

        let drainer = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.drain(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(guard);

        assert!(drainer.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out_with_stuck_work() {
        let coordinator = ShutdownCoordinator::new();
        let _guard = coordinator.begin_work();

        let start = tokio::time::Instant::now();
        let drained = coordinator.drain(Duration::from_secs(10)).await;

        assert!(!drained);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
