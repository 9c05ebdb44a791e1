//! Worker-side agent for supervised processes
//!
//! A forked worker detects the supervisor's environment marker, announces
//! itself online over stdio IPC, and then surfaces supervisor directives
//! as a plain channel the worker runtime can select on.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::ipc::{
    worker_id_from_env, IpcTransport, MessageEnvelope, StdioTransport, SupervisorMessage,
    WorkerMessage,
};

/// What the supervisor asked this worker to do
#[derive(Debug, Clone)]
pub enum SupervisorDirective {
    /// Stop accepting new work, drain, exit 0
    Shutdown,
    /// Opaque broadcast payload
    Control(serde_json::Value),
}

/// Agent running inside a supervised worker process
pub struct WorkerAgent {
    id: u32,
    transport: StdioTransport,
}

impl WorkerAgent {
    /// Detect the fork marker; None means this process was started
    /// directly (single-process mode)
    pub fn from_env() -> Option<Self> {
        worker_id_from_env().map(|id| Self {
            id,
            transport: StdioTransport::new(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Announce this worker online, then hand back the directive stream.
    ///
    /// A broken IPC link afterwards is treated as a shutdown directive:
    /// a worker must not outlive its supervisor.
    pub async fn start(mut self) -> Result<mpsc::Receiver<SupervisorDirective>, IpcError> {
        self.transport
            .send(&MessageEnvelope::new(WorkerMessage::Online {
                pid: std::process::id(),
            }))
            .await?;
        debug!(worker = self.id, "announced online to supervisor");

        let (tx, rx) = mpsc::channel(16);
        let (_writer, mut reader) = self.transport.into_split();

        tokio::spawn(async move {
            loop {
                match reader.receive::<SupervisorMessage>().await {
                    Ok(envelope) => {
                        let directive = match envelope.message {
                            SupervisorMessage::Shutdown => SupervisorDirective::Shutdown,
                            SupervisorMessage::Control { payload } => {
                                SupervisorDirective::Control(payload)
                            }
                        };
                        if tx.send(directive).await.is_err() {
                            break;
                        }
                    }
                    Err(IpcError::DeserializationError(e)) => {
                        warn!(error = %e, "ignoring malformed supervisor message");
                    }
                    Err(_) => {
                        let _ = tx.send(SupervisorDirective::Shutdown).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::WORKER_ID_ENV;

    #[test]
    fn test_agent_detects_fork_marker() {
        temp_env::with_var(WORKER_ID_ENV, Some("3"), || {
            let agent = WorkerAgent::from_env().expect("marker set");
            assert_eq!(agent.id(), 3);
        });
    }

    #[test]
    fn test_agent_absent_without_marker() {
        temp_env::with_var(WORKER_ID_ENV, None::<&str>, || {
            assert!(WorkerAgent::from_env().is_none());
        });
    }

    #[test]
    fn test_agent_ignores_garbage_marker() {
        temp_env::with_var(WORKER_ID_ENV, Some("not-a-number"), || {
            assert!(WorkerAgent::from_env().is_none());
        });
    }
}
