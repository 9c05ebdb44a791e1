//! Error types for the queue layer

use thiserror::Error;

/// Errors surfaced to job submitters
///
/// Deliberately small: backend unavailability is not an error from the
/// caller's point of view, it degrades to inline execution.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue name does not match any configured queue
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
}

/// Errors at the durable-backend boundary
#[derive(Error, Debug)]
pub enum BackendError {
    /// Endpoint scheme has no registered backend implementation
    #[error("unsupported backend scheme in endpoint '{0}'")]
    UnsupportedScheme(String),

    /// Endpoint string could not be parsed at all
    #[error("invalid backend endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Backend has been closed
    #[error("backend is closed")]
    Closed,

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Other(String),
}
