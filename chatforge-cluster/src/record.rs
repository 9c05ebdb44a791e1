//! Worker record bookkeeping
//!
//! One record per live worker process, owned exclusively by the
//! supervisor's event loop; workers never mutate their own record.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Worker lifecycle states as the supervisor sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Forked, not yet reported online
    Forking,
    /// Serving traffic and consuming queues
    Online,
    /// Told to drain; an exit from here is intentional
    Disconnected,
    /// Exited; the record is removed right after this transition
    Exited,
}

/// One live worker process under supervision
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    /// Stable for the process's lifetime, unique among live workers
    pub id: u32,
    pub pid: Option<u32>,
    pub state: WorkerState,
    /// True only when the supervisor itself disconnected the worker;
    /// controls whether the exit triggers a compensating fork
    pub exited_intentionally: bool,
    pub forked_at: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn forking(id: u32, pid: Option<u32>) -> Self {
        Self {
            id,
            pid,
            state: WorkerState::Forking,
            exited_intentionally: false,
            forked_at: Utc::now(),
        }
    }
}

/// Point-in-time view of one worker, for operator inspection
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub id: u32,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub uptime_seconds: i64,
}

impl From<&WorkerRecord> for WorkerStats {
    fn from(record: &WorkerRecord) -> Self {
        Self {
            id: record.id,
            pid: record.pid,
            state: record.state,
            uptime_seconds: Utc::now()
                .signed_duration_since(record.forked_at)
                .num_seconds(),
        }
    }
}
