//! Client-facing control socket.
//!
//! Newline-delimited JSON over a Unix socket (one object per line,
//! persistent connections): one accept loop, one task per client
//! connection, shutdown signalled over the daemon quit channel. A fatal
//! error on the listening socket marks the client-listener subsystem
//! degraded and tears the server down.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cmd;
use crate::context::DaemonContext;
use crate::error::CommandError;
use crate::health::HealthSubsystem;
use crate::protocol::{ClientReply, ClientRequest};

/// Runs the control server until shutdown is signalled.
pub async fn run_control_server(ctx: Arc<DaemonContext>, socket_path: &Path) -> Result<()> {
    // Check for a live daemon behind an existing socket before assuming it
    // is stale.
    if socket_path.exists() {
        if UnixStream::connect(socket_path).await.is_ok() {
            anyhow::bail!("another session daemon is already listening");
        }
        fs::remove_file(socket_path).context("Failed to remove stale control socket")?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind control socket {}", socket_path.display()))?;
    fs::set_permissions(socket_path, fs::Permissions::from_mode(0o660))
        .context("Failed to set control socket permissions")?;

    info!(path = %socket_path.display(), "control server listening");

    let mut shutdown = ctx.subscribe_shutdown();
    let result = loop {
        tokio::select! {
            _ = shutdown.recv() => break Ok(()),
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        ctx.health.set_degraded(HealthSubsystem::ClientListener);
                        break Err(anyhow::Error::from(e).context("control socket accept failed"));
                    }
                };
                let conn_ctx = ctx.clone();
                let conn_shutdown = ctx.subscribe_shutdown();
                tokio::spawn(serve_client(conn_ctx, stream, conn_shutdown));
            }
        }
    };

    let _ = fs::remove_file(socket_path);
    result
}

/// One client connection: read a request line, dispatch, write the reply.
async fn serve_client(
    ctx: Arc<DaemonContext>,
    stream: UnixStream,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = String::new();
        tokio::select! {
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => break,
                    Ok(_) => {
                        let reply = handle_line(&ctx, &line).await;
                        let json = match serde_json::to_string(&reply) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "failed to serialize reply");
                                continue;
                            }
                        };
                        if writer.write_all(format!("{}\n", json).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn handle_line(ctx: &Arc<DaemonContext>, line: &str) -> ClientReply {
    match serde_json::from_str::<ClientRequest>(line) {
        Ok(request) => {
            debug!(?request, "dispatching");
            cmd::dispatch(ctx, request).await
        }
        Err(e) => ClientReply::Error(CommandError::InvalidState {
            message: format!("malformed request: {}", e),
        }),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
