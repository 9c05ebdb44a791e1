//! The chatforge binary
//!
//! One executable serves three roles: the supervisor (primary process),
//! a forked worker (detected through the environment marker the
//! supervisor sets), and the single-process mode used when clustering is
//! disabled. Single-process mode is a first-class deployment shape, not a
//! fallback.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chatforge_cluster::{
    ClusterEvent, ProcessLauncher, Supervisor, SupervisorDirective, WorkerAgent,
};
use chatforge_config::{ChatforgeConfig, ConfigLoader, LogFormat, LoggingConfig};
use chatforge_server::WorkerRuntime;

mod cli;
mod handlers;

use cli::{Cli, Commands, ConfigCommands};
use handlers::default_router;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { command } => run_config_command(command, cli.config),
        Commands::Serve => {
            let config = ConfigLoader::new()
                .load(cli.config.as_deref())
                .context("failed to load configuration")?;
            init_tracing(&config.logging);
            serve(config).await
        }
    }
}

fn run_config_command(command: ConfigCommands, _config: Option<std::path::PathBuf>) -> Result<()> {
    match command {
        ConfigCommands::Generate => {
            print!("{}", ChatforgeConfig::generate_sample());
            Ok(())
        }
        ConfigCommands::Validate { path } => {
            ConfigLoader::new()
                .from_file(&path)
                .with_context(|| format!("invalid configuration: {}", path.display()))?;
            println!("{} is valid", path.display());
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatforge={}", logging.level.as_str())));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.include_targets);

    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn serve(config: ChatforgeConfig) -> Result<()> {
    // Worker-role detection comes first: a forked worker must never
    // re-enter the supervisor path
    if let Some(agent) = WorkerAgent::from_env() {
        return run_worker(config, agent).await;
    }

    if config.cluster.enabled {
        run_supervisor(config).await
    } else {
        run_single(config).await
    }
}

/// Primary process: fork and supervise the worker fleet
async fn run_supervisor(config: ChatforgeConfig) -> Result<()> {
    let supervisor = Supervisor::new(config.cluster.clone(), Arc::new(ProcessLauncher));
    info!(target = supervisor.target(), "starting clustered chatforge");

    // Observability consumer for the cluster event stream
    let mut events = supervisor.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClusterEvent::HealthDegraded { online, target }) => {
                    warn!(online, target, "cluster health degraded");
                }
                Ok(event) => info!(?event, "cluster event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let code = supervisor.run(termination_signal()).await;
    if code != 0 {
        // Deadline-forced shutdown: report the degraded exit to the OS
        std::process::exit(code);
    }
    Ok(())
}

/// Forked worker: serve, report online, obey supervisor directives
async fn run_worker(config: ChatforgeConfig, agent: WorkerAgent) -> Result<()> {
    let worker_id = agent.id();
    let runtime = WorkerRuntime::new(config, default_router()).await;
    let listener = runtime.bind().await?;

    // Online is reported only after the server socket is bound and the
    // queue consumers are installed
    let mut directives = agent.start().await?;
    info!(worker = worker_id, "worker online");

    let shutdown = async move {
        while let Some(directive) = directives.recv().await {
            match directive {
                SupervisorDirective::Shutdown => break,
                SupervisorDirective::Control(payload) => {
                    info!(worker = worker_id, ?payload, "control broadcast received");
                }
            }
        }
    };

    runtime.serve(listener, shutdown).await?;
    // Exit 0 tells the supervisor this shutdown was intentional
    Ok(())
}

/// Clustering disabled: this process is the sole worker
async fn run_single(config: ChatforgeConfig) -> Result<()> {
    info!("clustering disabled, running single-process chatforge");
    let runtime = WorkerRuntime::new(config, default_router()).await;
    runtime.run(termination_signal()).await?;
    Ok(())
}

/// Resolves when the process receives a termination signal
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
