//! spoord — the spoor session daemon.
//!
//! Wires the process-scoped context, spawns the health responder and the
//! per-domain consumer error monitors, then serves the client control
//! socket until interrupted. Teardown order: stop accepting commands, let
//! in-flight commands drain, tear down consumer handles, drop the context.

use anyhow::{Context, Result};
use clap::Parser;
use fs2::FileExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use spoor::config::DaemonConfig;
use spoor::consumer::handle::{run_error_monitor, ConsumerHandle};
use spoor::context::DaemonContext;
use spoor::domain::TraceDomain;
use spoor::health::responder::run_health_responder;
use spoor::notification::ChannelBridge;
use spoor::paths;
use spoor::server::run_control_server;
use spoor::tracer::SpoolTracer;

#[derive(Parser)]
#[command(name = "spoord")]
#[command(about = "Tracing session control-plane daemon")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the client control socket path
    #[arg(long)]
    client_sock: Option<PathBuf>,

    /// Override the health check socket path
    #[arg(long)]
    health_sock: Option<PathBuf>,

    /// Spool directory for the file-backed tracer stand-in
    #[arg(long)]
    spool_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig::load(cli.config.as_deref())?;

    let run_dir = paths::run_dir()?;
    paths::create_run_dir_with_perm(&run_dir, Some(&config.tracing_group))?;

    // Refuse to run twice against the same run directory.
    let lock_path = paths::lock_file_path()?;
    let lock_file = std::fs::File::create(&lock_path)
        .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .context("another spoord is already running")?;

    let command_timeout = Duration::from_secs(config.consumer.command_timeout_secs);
    let mut consumers = HashMap::new();
    for domain in TraceDomain::ALL {
        let handle = Arc::new(ConsumerHandle::new(
            domain,
            paths::consumer_cmd_sock_path(domain)?,
            paths::consumer_err_sock_path(domain)?,
            command_timeout,
        ));
        consumers.insert(domain, handle);
    }

    let (bridge, mut notifications) = ChannelBridge::new();
    let spool_dir = match cli.spool_dir {
        Some(dir) => dir,
        None => run_dir.join("spool"),
    };
    let ctx = Arc::new(DaemonContext::new(
        config,
        consumers,
        Arc::new(SpoolTracer::new(spool_dir)),
        Arc::new(bridge),
    ));

    // Stand-in drain for the notification subsystem: log what it would
    // evaluate.
    tokio::spawn(async move {
        while let Some(event) = notifications.recv().await {
            debug!(?event, "notification event");
        }
    });

    let health_sock = match cli.health_sock {
        Some(path) => path,
        None => paths::health_sock_path()?,
    };
    {
        let registry = ctx.health.clone();
        let shutdown = ctx.subscribe_shutdown();
        tokio::spawn(async move {
            if let Err(e) = run_health_responder(registry, &health_sock, shutdown).await {
                error!(error = %e, "health responder failed");
            }
        });
    }

    for handle in ctx.consumers() {
        let handle = handle.clone();
        let health = ctx.health.clone();
        let shutdown = ctx.subscribe_shutdown();
        tokio::spawn(async move {
            let domain = handle.domain();
            if let Err(e) = run_error_monitor(handle, health, shutdown).await {
                error!(%domain, error = %e, "consumer error monitor failed");
            }
        });
    }

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            ctx.signal_shutdown();
        });
    }

    let client_sock = match cli.client_sock {
        Some(path) => path,
        None => paths::client_sock_path()?,
    };
    let result = run_control_server(ctx.clone(), &client_sock).await;

    // The listener is gone; give in-flight command tasks a moment to settle
    // before dropping the consumer connections.
    tokio::time::sleep(Duration::from_millis(200)).await;
    for handle in ctx.consumers() {
        if let Some(pid) = handle.pid() {
            debug!(domain = %handle.domain(), pid, "detaching consumer");
        }
    }
    ctx.teardown_consumers().await;

    let _ = fs2::FileExt::unlock(&lock_file);
    let _ = std::fs::remove_file(&lock_path);
    result
}
