//! Process supervision for Chatforge
//!
//! The supervisor is the primary process: it forks worker processes
//! running the full server, restarts crashed ones, watches aggregate
//! health, fans out best-effort control broadcasts, and bounds graceful
//! shutdown with a hard deadline. Workers talk back over newline-delimited
//! JSON on their stdio.
//!
//! When clustering is disabled the supervisor is bypassed entirely and
//! the calling process is the sole worker; that mode lives in the binary
//! crate, not here.

pub mod error;
pub mod events;
pub mod ipc;
pub mod record;
pub mod supervisor;
pub mod worker;

// Re-export main types
pub use error::{ClusterError, IpcError};
pub use events::ClusterEvent;
pub use ipc::{
    worker_id_from_env, ChildProcessTransport, IpcTransport, MessageEnvelope, StdioTransport,
    SupervisorMessage, WorkerMessage, IPC_PROTOCOL_VERSION, WORKER_ID_ENV,
};
pub use record::{WorkerRecord, WorkerState, WorkerStats};
pub use supervisor::{
    target_workers, ProcessLauncher, SpawnedWorker, Supervisor, SupervisorHandle, WorkerEvent,
    WorkerLauncher,
};
pub use worker::{SupervisorDirective, WorkerAgent};
