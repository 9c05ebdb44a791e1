//! Queue observability events
//!
//! A single tagged union published on a broadcast channel; logging and
//! metrics collaborators subscribe instead of registering callbacks.

use serde::Serialize;

/// Events emitted by the queue manager
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// The manager entered degraded mode for the process lifetime
    Downgraded { reason: String },

    /// A durable-mode enqueue failed; the submission fell back to inline
    SubmitFailed { queue: String, reason: String },
}
