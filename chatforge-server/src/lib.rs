//! Per-worker runtime for Chatforge
//!
//! One instance of this runtime runs in every worker process (and in the
//! sole process when clustering is disabled). It wires the queue manager
//! and its consumers to the injected per-queue job handlers, serves the
//! ops HTTP surface, and drains in-flight work on shutdown under the
//! worker's own deadline.

pub mod error;
pub mod router;
pub mod routes;
pub mod runtime;

pub use error::ServerError;
pub use router::QueueRouter;
pub use routes::ops_router;
pub use runtime::WorkerRuntime;
