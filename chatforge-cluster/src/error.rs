//! Error types for process supervision and IPC

use thiserror::Error;

/// IPC errors between supervisor and workers
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u32, actual: u32 },
}

/// Cluster supervision errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to fork worker {id}: {source}")]
    ForkFailed {
        id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker executable not resolvable: {0}")]
    ExecutableNotFound(std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
}
