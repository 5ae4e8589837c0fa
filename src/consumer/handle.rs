//! Per-domain consumer daemon record.
//!
//! One handle exists per tracing domain. It owns the lifecycle of the
//! command-socket connection to that domain's consumer process and the
//! process-id field reported over the error socket. Socket exchanges go
//! through [`ConsumerHandle::with_client`], which serializes commands to the
//! consumer without holding any session lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};
use crate::health::{HealthRegistry, HealthSubsystem};

use super::client::ConsumerClient;

/// Connection state guarded by the handle's mutex.
struct ConsumerConnection {
    /// Where the consumer's command socket lives. Updated when a consumer
    /// registers itself with an explicit path.
    cmd_sock_path: PathBuf,
    /// Established connection, opened lazily on first use.
    client: Option<ConsumerClient>,
}

/// Record of one domain's live consumer process.
pub struct ConsumerHandle {
    domain: TraceDomain,
    conn: Mutex<ConsumerConnection>,
    /// Reported once over the error socket, read by any command thread.
    pid: std::sync::Mutex<Option<i32>>,
    err_sock_path: PathBuf,
    command_timeout: Duration,
}

impl ConsumerHandle {
    pub fn new(
        domain: TraceDomain,
        cmd_sock_path: PathBuf,
        err_sock_path: PathBuf,
        command_timeout: Duration,
    ) -> Self {
        Self {
            domain,
            conn: Mutex::new(ConsumerConnection {
                cmd_sock_path,
                client: None,
            }),
            pid: std::sync::Mutex::new(None),
            err_sock_path,
            command_timeout,
        }
    }

    pub fn domain(&self) -> TraceDomain {
        self.domain
    }

    pub fn err_sock_path(&self) -> &PathBuf {
        &self.err_sock_path
    }

    /// Records the consumer's pid. Set once; a differing re-registration is
    /// logged and takes effect (the consumer restarted).
    pub fn set_pid(&self, pid: i32) {
        let mut guard = self.pid.lock().expect("pid mutex poisoned");
        if let Some(existing) = *guard {
            if existing != pid {
                info!(domain = %self.domain, old = existing, new = pid, "consumer pid changed");
            }
        }
        *guard = Some(pid);
    }

    pub fn pid(&self) -> Option<i32> {
        *self.pid.lock().expect("pid mutex poisoned")
    }

    /// Re-points the handle at a consumer's command socket and drops any
    /// stale connection.
    pub async fn register_socket(&self, cmd_sock_path: PathBuf) {
        let mut conn = self.conn.lock().await;
        conn.cmd_sock_path = cmd_sock_path;
        conn.client = None;
    }

    /// Runs one protocol exchange against this consumer, connecting lazily.
    ///
    /// On a communication error the cached connection is dropped so the next
    /// exchange reconnects from scratch.
    pub async fn with_client<R>(
        &self,
        f: impl FnOnce(&mut ConsumerClient) -> CommandResult<R>,
    ) -> CommandResult<R> {
        let mut conn = self.conn.lock().await;
        if conn.client.is_none() {
            let client = ConsumerClient::connect(&conn.cmd_sock_path, self.command_timeout)?;
            debug!(domain = %self.domain, path = %conn.cmd_sock_path.display(),
                "connected to consumer");
            conn.client = Some(client);
        }
        let client = conn.client.as_mut().ok_or_else(|| {
            CommandError::consumer("connect command socket", "connection unavailable")
        })?;
        let result = f(client);
        if matches!(result, Err(CommandError::ConsumerCommunication { .. })) {
            conn.client = None;
        }
        result
    }

    /// Drops the command-socket connection, releasing the descriptor.
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        conn.client = None;
    }
}

/// Dedicated per-domain task watching a consumer's error socket.
///
/// The consumer connects back after launch, reports its pid and a ready
/// code, then sends an error code whenever one of its own subsystems fails.
/// A nonzero code marks the domain's health subsystem degraded. The task
/// unwinds on the shutdown signal, releasing its listener.
pub async fn run_error_monitor(
    handle: Arc<ConsumerHandle>,
    health: Arc<HealthRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let path = handle.err_sock_path().clone();
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    let listener = UnixListener::bind(&path)?;
    let subsystem = handle.domain().health_subsystem();
    debug!(domain = %handle.domain(), path = %path.display(), "error monitor listening");

    let result = loop {
        tokio::select! {
            _ = shutdown.recv() => break Ok(()),
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => break Err(anyhow::Error::from(e)),
                };
                tokio::select! {
                    _ = shutdown.recv() => break Ok(()),
                    _ = serve_error_conn(&handle, &health, subsystem, stream) => {}
                }
            }
        }
    };

    if result.is_err() {
        health.set_degraded(subsystem);
    }
    let _ = std::fs::remove_file(&path);
    result
}

/// Drains one consumer's error-socket connection until EOF.
async fn serve_error_conn(
    handle: &ConsumerHandle,
    health: &HealthRegistry,
    subsystem: HealthSubsystem,
    mut stream: UnixStream,
) {
    // First word is the consumer pid, second its ready code; every
    // subsequent word is an error report.
    let pid = match read_word(&mut stream).await {
        Some(pid) => pid,
        None => return,
    };
    handle.set_pid(pid);

    match read_word(&mut stream).await {
        Some(0) => {
            health.set_healthy(subsystem);
            info!(domain = %handle.domain(), pid, "consumer ready");
        }
        Some(code) => {
            health.set_degraded(subsystem);
            warn!(domain = %handle.domain(), code, "consumer failed to start");
            return;
        }
        None => return,
    }

    loop {
        match read_word(&mut stream).await {
            Some(0) => health.set_healthy(subsystem),
            Some(code) => {
                health.set_degraded(subsystem);
                warn!(domain = %handle.domain(), code, "consumer reported error");
            }
            None => break,
        }
    }

    // Connection gone: the consumer exited or was killed.
    health.set_degraded(subsystem);
    warn!(domain = %handle.domain(), "consumer error socket closed");
    handle.disconnect().await;
}

/// Reads one little-endian i32, returning `None` on EOF or error.
async fn read_word(stream: &mut UnixStream) -> Option<i32> {
    let mut buf = [0u8; 4];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Some(i32::from_le_bytes(buf)),
        Err(_) => None,
    }
}
