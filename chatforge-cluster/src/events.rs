//! Cluster observability events
//!
//! One tagged union on a broadcast channel; the supervisor publishes,
//! logging and metrics collaborators subscribe.

use serde::Serialize;

/// Events emitted by the process supervisor
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// A worker process was forked
    WorkerForked { id: u32, pid: Option<u32> },

    /// A worker reported itself online over IPC
    WorkerOnline { id: u32 },

    /// A worker exited; `restarted` is true when a compensating fork
    /// replaced it
    WorkerExited {
        id: u32,
        code: Option<i32>,
        signal: Option<i32>,
        restarted: bool,
    },

    /// Fewer than half the target workers are online
    HealthDegraded { online: usize, target: usize },
}
