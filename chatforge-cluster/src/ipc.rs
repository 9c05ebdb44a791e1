//! Supervisor/worker IPC: protocol definitions and transports
//!
//! Newline-delimited JSON envelopes over the worker's stdin/stdout, with a
//! protocol version check on receive. Control flows downstream
//! (supervisor to worker); lifecycle reports flow upstream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the worker id into forked processes
pub const WORKER_ID_ENV: &str = "CHATFORGE_WORKER_ID";

/// Versioned wrapper around every IPC message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub sent_at: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            sent_at: Utc::now(),
            message,
        }
    }
}

/// Messages sent from the supervisor to worker processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorMessage {
    /// Stop accepting new work, drain, and exit 0
    Shutdown,

    /// Best-effort control fan-out; payload is opaque to the cluster layer
    Control { payload: JsonValue },
}

/// Messages sent from worker processes to the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The worker has bound its server and is consuming queues
    Online { pid: u32 },
}

/// Write half: newline-delimited JSON envelopes
pub struct JsonLineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> JsonLineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<T: Serialize>(&mut self, envelope: &MessageEnvelope<T>) -> Result<(), IpcError> {
        let json = serde_json::to_string(envelope)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;

        let line = format!("{}\n", json);
        self.inner
            .write_all(line.as_bytes())
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))?;
        self.inner
            .flush()
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Read half: newline-delimited JSON envelopes with version checking
pub struct JsonLineReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> JsonLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<MessageEnvelope<T>, IpcError> {
        let mut line = String::new();
        let read = self
            .inner
            .read_line(&mut line)
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))?;

        if read == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let envelope: MessageEnvelope<T> = serde_json::from_str(line.trim_end())
            .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

        if envelope.protocol_version != IPC_PROTOCOL_VERSION {
            return Err(IpcError::ProtocolVersionMismatch {
                expected: IPC_PROTOCOL_VERSION,
                actual: envelope.protocol_version,
            });
        }

        Ok(envelope)
    }
}

/// IPC transport trait for one end of a supervisor/worker link
#[async_trait]
pub trait IpcTransport: Send {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError>;

    /// Receive a message from the other end
    async fn receive<T: DeserializeOwned + Send>(&mut self) -> Result<MessageEnvelope<T>, IpcError>;
}

/// Stdin/stdout transport used on the worker side
pub struct StdioTransport {
    writer: JsonLineWriter<tokio::io::Stdout>,
    reader: JsonLineReader<tokio::io::Stdin>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            writer: JsonLineWriter::new(tokio::io::stdout()),
            reader: JsonLineReader::new(tokio::io::stdin()),
        }
    }

    /// Split into independently-owned halves so reads and writes can live
    /// on different tasks
    pub fn into_split(
        self,
    ) -> (
        JsonLineWriter<tokio::io::Stdout>,
        JsonLineReader<tokio::io::Stdin>,
    ) {
        (self.writer, self.reader)
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IpcTransport for StdioTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        self.writer.send(message).await
    }

    async fn receive<T: DeserializeOwned + Send>(&mut self) -> Result<MessageEnvelope<T>, IpcError> {
        self.reader.receive().await
    }
}

/// Child-process transport used on the supervisor side
pub struct ChildProcessTransport {
    writer: JsonLineWriter<tokio::process::ChildStdin>,
    reader: JsonLineReader<tokio::process::ChildStdout>,
}

impl ChildProcessTransport {
    pub fn new(stdin: tokio::process::ChildStdin, stdout: tokio::process::ChildStdout) -> Self {
        Self {
            writer: JsonLineWriter::new(stdin),
            reader: JsonLineReader::new(stdout),
        }
    }

    /// Split into independently-owned halves so the write pump and read
    /// pump can live on different tasks
    pub fn into_split(
        self,
    ) -> (
        JsonLineWriter<tokio::process::ChildStdin>,
        JsonLineReader<tokio::process::ChildStdout>,
    ) {
        (self.writer, self.reader)
    }
}

#[async_trait]
impl IpcTransport for ChildProcessTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        self.writer.send(message).await
    }

    async fn receive<T: DeserializeOwned + Send>(&mut self) -> Result<MessageEnvelope<T>, IpcError> {
        self.reader.receive().await
    }
}

/// Read the worker id marker set by the supervisor on fork, if present
pub fn worker_id_from_env() -> Option<u32> {
    std::env::var(WORKER_ID_ENV).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_envelope_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, client_write) = tokio::io::split(client);

        let mut writer = JsonLineWriter::new(client_write);
        let mut reader = JsonLineReader::new(server_read);

        writer
            .send(&MessageEnvelope::new(SupervisorMessage::Control {
                payload: json!({"cache": "flush"}),
            }))
            .await
            .unwrap();
        writer
            .send(&MessageEnvelope::new(SupervisorMessage::Shutdown))
            .await
            .unwrap();

        let first: MessageEnvelope<SupervisorMessage> = reader.receive().await.unwrap();
        assert!(matches!(first.message, SupervisorMessage::Control { .. }));

        let second: MessageEnvelope<SupervisorMessage> = reader.receive().await.unwrap();
        assert!(matches!(second.message, SupervisorMessage::Shutdown));
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, mut client_write) = tokio::io::split(client);

        let bogus = json!({
            "protocol_version": 99,
            "sent_at": Utc::now(),
            "message": {"type": "shutdown"}
        });
        client_write
            .write_all(format!("{}\n", bogus).as_bytes())
            .await
            .unwrap();

        let mut reader = JsonLineReader::new(server_read);
        let err = reader.receive::<SupervisorMessage>().await.unwrap_err();
        assert!(matches!(err, IpcError::ProtocolVersionMismatch { expected: 1, actual: 99 }));
    }

    #[tokio::test]
    async fn test_closed_stream_reports_connection_closed() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, _server_write) = tokio::io::split(server);
        drop(client);

        let mut reader = JsonLineReader::new(server_read);
        let err = reader.receive::<WorkerMessage>().await.unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed));
    }

    #[test]
    fn test_worker_message_wire_format() {
        let envelope = MessageEnvelope::new(WorkerMessage::Online { pid: 4242 });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["protocol_version"], 1);
        assert_eq!(json["message"]["type"], "online");
        assert_eq!(json["message"]["pid"], 4242);
    }
}
