//! Process supervisor
//!
//! The primary process forks worker processes, restarts crashed ones,
//! monitors aggregate health, fans out control messages, and coordinates
//! graceful shutdown under a hard deadline. The worker record set is
//! mutated only by the supervisor's event loop (single writer); all
//! process lifecycle signals arrive as messages on one channel.

use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use chatforge_config::ClusterConfig;

use crate::error::ClusterError;
use crate::events::ClusterEvent;
use crate::ipc::{ChildProcessTransport, MessageEnvelope, SupervisorMessage, WorkerMessage, WORKER_ID_ENV};
use crate::record::{WorkerRecord, WorkerState, WorkerStats};

/// Lifecycle signals reported for one worker process
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The worker announced itself over IPC
    Online,
    /// The OS process exited
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// Channels attached to one spawned worker process
pub struct SpawnedWorker {
    pub pid: Option<u32>,
    /// Control messages down to the worker (shutdown, broadcast)
    pub control: mpsc::Sender<SupervisorMessage>,
    /// Lifecycle signals up from the worker
    pub events: mpsc::Receiver<WorkerEvent>,
    /// Force-termination trigger, used when the shutdown deadline expires
    pub kill: mpsc::Sender<()>,
}

/// Boundary for creating worker processes, so supervision logic is
/// testable without forking real processes
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn spawn(&self, id: u32) -> Result<SpawnedWorker, ClusterError>;
}

/// Launches real OS worker processes by re-executing the current binary
/// with the worker id marker in the environment
pub struct ProcessLauncher;

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn spawn(&self, id: u32) -> Result<SpawnedWorker, ClusterError> {
        let exe = std::env::current_exe().map_err(ClusterError::ExecutableNotFound)?;
        let mut child = Command::new(exe)
            .env(WORKER_ID_ENV, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| ClusterError::ForkFailed { id, source })?;

        let pid = child.id();
        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                return Err(ClusterError::ForkFailed {
                    id,
                    source: std::io::Error::other("child stdin not captured"),
                })
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                return Err(ClusterError::ForkFailed {
                    id,
                    source: std::io::Error::other("child stdout not captured"),
                })
            }
        };

        let (mut writer, mut reader) = ChildProcessTransport::new(stdin, stdout).into_split();
        let (control_tx, mut control_rx) = mpsc::channel::<SupervisorMessage>(16);
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>(16);
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);

        // Write pump: control messages down to the worker
        tokio::spawn(async move {
            while let Some(message) = control_rx.recv().await {
                if writer.send(&MessageEnvelope::new(message)).await.is_err() {
                    // Worker side is gone; the wait task reports the exit
                    break;
                }
            }
        });

        // Read pump: lifecycle reports up from the worker
        let read_events = event_tx.clone();
        tokio::spawn(async move {
            while let Ok(envelope) = reader.receive::<WorkerMessage>().await {
                match envelope.message {
                    WorkerMessage::Online { .. } => {
                        if read_events.send(WorkerEvent::Online).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Wait task owns the child: reports the exit, and escalates
        // SIGTERM-then-SIGKILL when asked to force-terminate
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx.recv() => {
                    #[cfg(unix)]
                    if let Some(pid) = child.id() {
                        use nix::sys::signal::Signal;
                        use nix::unistd::Pid;
                        let _ = nix::sys::signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                    }
                    match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                        Ok(status) => status,
                        Err(_) => {
                            let _ = child.start_kill();
                            child.wait().await
                        }
                    }
                }
            };

            let (code, signal) = match status {
                Ok(status) => (status.code(), exit_signal(&status)),
                Err(_) => (None, None),
            };
            let _ = event_tx.send(WorkerEvent::Exited { code, signal }).await;
        });

        Ok(SpawnedWorker {
            pid,
            control: control_tx,
            events: event_rx,
            kill: kill_tx,
        })
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Clamp the configured worker count to available CPU parallelism
pub fn target_workers(requested: usize, parallelism: usize) -> usize {
    requested.min(parallelism).max(1)
}

/// Operator-facing commands into a running supervisor
enum SupervisorCommand {
    Broadcast { payload: JsonValue },
    Stats { reply: oneshot::Sender<Vec<WorkerStats>> },
}

/// Cheap handle for interacting with a running supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    /// Best-effort fan-out of a control payload to every online worker.
    /// No acknowledgement, no retry; never use this for work assignment.
    pub async fn broadcast(&self, payload: JsonValue) {
        let _ = self
            .commands
            .send(SupervisorCommand::Broadcast { payload })
            .await;
    }

    /// Snapshot of the live worker records
    pub async fn stats(&self) -> Option<Vec<WorkerStats>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SupervisorCommand::Stats { reply })
            .await
            .ok()?;
        rx.await.ok()
    }
}

struct WorkerLink {
    control: mpsc::Sender<SupervisorMessage>,
    kill: mpsc::Sender<()>,
}

/// The primary process: keeps the worker fleet at target size and shuts
/// it down cleanly on request
pub struct Supervisor {
    config: ClusterConfig,
    target: usize,
    launcher: Arc<dyn WorkerLauncher>,
    records: HashMap<u32, WorkerRecord>,
    links: HashMap<u32, WorkerLink>,
    next_worker_id: u32,
    worker_tx: mpsc::Sender<(u32, WorkerEvent)>,
    worker_rx: mpsc::Receiver<(u32, WorkerEvent)>,
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    cmd_rx: mpsc::Receiver<SupervisorCommand>,
    events: broadcast::Sender<ClusterEvent>,
    shutting_down: bool,
}

impl Supervisor {
    pub fn new(config: ClusterConfig, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self::with_parallelism(config, launcher, num_cpus::get())
    }

    /// Clamp the target against an explicit parallelism instead of the
    /// detected CPU count
    pub fn with_parallelism(
        config: ClusterConfig,
        launcher: Arc<dyn WorkerLauncher>,
        parallelism: usize,
    ) -> Self {
        let target = target_workers(config.max_workers, parallelism);
        let (worker_tx, worker_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(256);

        Self {
            config,
            target,
            launcher,
            records: HashMap::new(),
            links: HashMap::new(),
            next_worker_id: 0,
            worker_tx,
            worker_rx,
            cmd_tx,
            cmd_rx,
            events,
            shutting_down: false,
        }
    }

    /// Effective worker target after the parallelism clamp
    pub fn target(&self) -> usize {
        self.target
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            commands: self.cmd_tx.clone(),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    /// Run until the shutdown future resolves. Returns the process exit
    /// code: 0 for a clean drain, 1 when the deadline forced termination.
    pub async fn run<F>(mut self, shutdown: F) -> i32
    where
        F: Future<Output = ()>,
    {
        info!(target = self.target, "supervisor starting worker fleet");
        for _ in 0..self.target {
            self.fork().await;
        }

        tokio::pin!(shutdown);
        let mut health = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.health_check_interval,
            self.config.health_check_interval,
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    return self.graceful_shutdown().await;
                }
                _ = health.tick() => {
                    self.health_check().await;
                }
                Some((id, event)) = self.worker_rx.recv() => {
                    self.handle_worker_event(id, event).await;
                }
                Some(command) = self.cmd_rx.recv() => {
                    self.handle_command(command).await;
                }
            }
        }
    }

    /// Fork one worker. Returns false on failure; capacity is retried on
    /// the next exit event or health tick rather than crash-looping.
    async fn fork(&mut self) -> bool {
        self.next_worker_id += 1;
        let id = self.next_worker_id;

        match self.launcher.spawn(id).await {
            Ok(spawned) => {
                let SpawnedWorker {
                    pid,
                    control,
                    mut events,
                    kill,
                } = spawned;

                self.records.insert(id, WorkerRecord::forking(id, pid));
                self.links.insert(id, WorkerLink { control, kill });

                // Merge this worker's signals into the supervisor's single
                // event channel
                let forward = self.worker_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let exited = matches!(event, WorkerEvent::Exited { .. });
                        if forward.send((id, event)).await.is_err() || exited {
                            break;
                        }
                    }
                });

                info!(worker = id, pid, "forked worker");
                let _ = self.events.send(ClusterEvent::WorkerForked { id, pid });
                true
            }
            Err(e) => {
                error!(worker = id, error = %e, "failed to fork worker");
                false
            }
        }
    }

    async fn handle_worker_event(&mut self, id: u32, event: WorkerEvent) {
        match event {
            WorkerEvent::Online => {
                if let Some(record) = self.records.get_mut(&id) {
                    record.state = WorkerState::Online;
                    debug!(worker = id, "worker online");
                    let _ = self.events.send(ClusterEvent::WorkerOnline { id });
                }
            }
            WorkerEvent::Exited { code, signal } => {
                let Some(record) = self.records.remove(&id) else {
                    return;
                };
                self.links.remove(&id);

                let restarted = if record.exited_intentionally || self.shutting_down {
                    false
                } else {
                    warn!(worker = id, code, signal, "worker exited unexpectedly, forking replacement");
                    self.fork().await
                };

                let _ = self.events.send(ClusterEvent::WorkerExited {
                    id,
                    code,
                    signal,
                    restarted,
                });
            }
        }
    }

    async fn health_check(&mut self) {
        let online = self
            .records
            .values()
            .filter(|r| r.state == WorkerState::Online)
            .count();

        if online * 2 < self.target {
            warn!(online, target = self.target, "less than half the worker fleet is online");
            let _ = self.events.send(ClusterEvent::HealthDegraded {
                online,
                target: self.target,
            });
        }

        // Top up capacity lost to failed forks. Restart-only otherwise:
        // the health check never force-rebalances live workers.
        while self.records.len() < self.target {
            if !self.fork().await {
                break;
            }
        }
    }

    async fn handle_command(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Broadcast { payload } => {
                for (id, link) in &self.links {
                    let online = self
                        .records
                        .get(id)
                        .map(|r| r.state == WorkerState::Online)
                        .unwrap_or(false);
                    if !online {
                        continue;
                    }
                    if link
                        .control
                        .send(SupervisorMessage::Control {
                            payload: payload.clone(),
                        })
                        .await
                        .is_err()
                    {
                        debug!(worker = id, "broadcast target unreachable");
                    }
                }
            }
            SupervisorCommand::Stats { reply } => {
                let stats = self.records.values().map(WorkerStats::from).collect();
                let _ = reply.send(stats);
            }
        }
    }

    /// Disconnect every worker and wait for clean exits under the hard
    /// deadline. Past the deadline, remaining workers are killed and the
    /// exit code is 1: bounded shutdown latency is bought by dropping
    /// whatever was still in flight.
    async fn graceful_shutdown(&mut self) -> i32 {
        info!(workers = self.records.len(), "graceful shutdown: disconnecting workers");
        self.shutting_down = true;

        for record in self.records.values_mut() {
            record.exited_intentionally = true;
            record.state = WorkerState::Disconnected;
        }
        for link in self.links.values() {
            let _ = link.control.send(SupervisorMessage::Shutdown).await;
        }

        let deadline = tokio::time::sleep(self.config.shutdown_deadline);
        tokio::pin!(deadline);

        while !self.records.is_empty() {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(remaining = self.records.len(), "shutdown deadline exceeded, killing remaining workers");
                    for link in self.links.values() {
                        let _ = link.kill.send(()).await;
                    }
                    return 1;
                }
                Some((id, event)) = self.worker_rx.recv() => {
                    self.handle_worker_event(id, event).await;
                }
            }
        }

        info!("all workers exited cleanly");
        0
    }
}
