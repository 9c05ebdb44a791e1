//! Typed background-job queues for Chatforge
//!
//! This crate owns the job model, the boundary trait for durable job
//! backends, the embedded in-process backend, and the `QueueManager` that
//! request handlers submit work through.
//!
//! The manager has two operating modes, decided once at startup: durable
//! (jobs are handed to a backend and executed by queue consumers) and
//! degraded (no backend reachable; every submission is echoed back to the
//! caller for synchronous inline execution). Submission never fails on
//! backend trouble - callers observe `SubmissionResult::Inline` and run
//! the work themselves.

pub mod backend;
pub mod embedded;
pub mod error;
pub mod events;
pub mod job;
pub mod manager;

// Re-export main types
pub use backend::{connect, ConsumerOptions, EnqueueOptions, HandlerError, JobBackend, JobHandler};
pub use embedded::EmbeddedBackend;
pub use error::{BackendError, QueueError};
pub use events::QueueEvent;
pub use job::{Job, JobId, JobStatus, QueueCounts, SubmissionResult, DEFAULT_PRIORITY};
pub use manager::{QueueManager, QueueSpec, StatsReport};
