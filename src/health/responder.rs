//! Health-check responder.
//!
//! A single task owning a Unix socket. Clients send a fixed-size request
//! containing the `CHECK` command tag; the reply is a 64-bit mask where bit
//! i is set when subsystem i is degraded. Short or malformed requests get no
//! reply; the connection is closed and other clients are unaffected.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{HealthRegistry, HealthSubsystem};

/// The only request command tag.
pub const HEALTH_CMD_CHECK: u32 = 0;

/// Wire size of a request (a single little-endian command tag).
pub const REQUEST_LEN: usize = 4;

/// Wire size of a reply (a little-endian degradation mask).
pub const REPLY_LEN: usize = 8;

/// Per-client read deadline. Bounds the blocking span so a stalled client
/// cannot wedge the responder.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the health responder until shutdown is signalled.
///
/// Listening-socket errors are fatal: the responder marks its own subsystem
/// degraded and returns, letting the caller tear down.
pub async fn run_health_responder(
    registry: Arc<HealthRegistry>,
    socket_path: &Path,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind health socket {}", socket_path.display()))?;
    fs::set_permissions(socket_path, fs::Permissions::from_mode(0o660)).with_context(|| {
        format!(
            "Failed to set permissions on health socket {}",
            socket_path.display()
        )
    })?;

    info!(path = %socket_path.display(), "health responder listening");

    let result = accept_loop(&registry, &listener, &mut shutdown).await;

    if result.is_err() {
        registry.set_degraded(HealthSubsystem::HealthResponder);
    }
    let _ = fs::remove_file(socket_path);
    result
}

async fn accept_loop(
    registry: &HealthRegistry,
    listener: &UnixListener,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        let mut stream = tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("Health socket accept failed")?;
                stream
            }
            _ = shutdown.recv() => {
                debug!("health responder shutting down");
                return Ok(());
            }
        };

        // One request/reply exchange per connection. A short request closes
        // the connection without a reply.
        let mut request = [0u8; REQUEST_LEN];
        let read =
            tokio::time::timeout(CLIENT_READ_TIMEOUT, stream.read_exact(&mut request)).await;
        match read {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "short health request, closing");
                continue;
            }
            Err(_) => {
                debug!("health client read timed out, closing");
                continue;
            }
        }

        let cmd = u32::from_le_bytes(request);
        if cmd != HEALTH_CMD_CHECK {
            debug!(cmd, "unknown health command, closing");
            continue;
        }

        let mask = registry.degraded_mask();
        if let Err(e) = stream.write_all(&mask.to_le_bytes()).await {
            warn!(error = %e, "failed to send health reply");
        }
    }
}
