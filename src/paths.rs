//! Run-directory and socket paths for the spoor daemon.
//!
//! Root daemons use the system run directory (`/var/run/spoor`); non-root
//! daemons use a per-home run directory (`$HOME/.spoor/run`). Both are
//! created with owner read/write/execute only before the first bind; when
//! running as root the configured tracing group is additionally granted
//! group access so unprivileged clients in that group can reach the sockets.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// System run directory used when the daemon runs as root.
const SYSTEM_RUN_DIR: &str = "/var/run/spoor";

/// Per-home run directory used for non-root daemons, relative to `$HOME`.
const HOME_RUN_DIR: &str = ".spoor/run";

/// Environment variable overriding the health-check socket path.
pub const HEALTH_SOCK_ENV: &str = "SPOOR_HEALTH_SOCK";

/// Environment variable overriding the run directory itself.
pub const RUN_DIR_ENV: &str = "SPOOR_RUN_DIR";

/// Returns the daemon run directory, honoring `SPOOR_RUN_DIR`.
///
/// The directory is not created here; callers go through
/// [`create_run_dir_with_perm`] before binding any socket in it.
///
/// # Errors
///
/// Returns an error if the daemon runs unprivileged and the home directory
/// cannot be determined.
pub fn run_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(RUN_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    if nix::unistd::geteuid().is_root() {
        return Ok(PathBuf::from(SYSTEM_RUN_DIR));
    }
    let home = dirs::home_dir().context("Could not determine home directory for run dir")?;
    Ok(home.join(HOME_RUN_DIR))
}

/// Creates `dir` (and parents) with `0o700` permissions.
///
/// When running as root and a tracing group is given, ownership is changed to
/// `root:<group>` and group read/execute is granted. An unknown group is
/// downgraded to a warning; the directory then stays owner-only.
pub fn create_run_dir_with_perm(dir: &Path, tracing_group: Option<&str>) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create run directory: {}", dir.display()))?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;

    if !nix::unistd::geteuid().is_root() {
        return Ok(());
    }

    if let Some(group) = tracing_group {
        match nix::unistd::Group::from_name(group) {
            Ok(Some(grp)) => {
                nix::unistd::chown(dir, Some(nix::unistd::Uid::from_raw(0)), Some(grp.gid))
                    .with_context(|| format!("Failed to set group on {}", dir.display()))?;
                fs::set_permissions(dir, fs::Permissions::from_mode(0o750))
                    .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
            }
            Ok(None) => {
                tracing::warn!(group, "tracing group not found, run dir stays owner-only");
            }
            Err(e) => {
                tracing::warn!(group, error = %e, "tracing group lookup failed");
            }
        }
    }
    Ok(())
}

/// Returns the health-check socket path, honoring `SPOOR_HEALTH_SOCK`.
pub fn health_sock_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(HEALTH_SOCK_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(run_dir()?.join("health.sock"))
}

/// Returns the client control socket path.
pub fn client_sock_path() -> Result<PathBuf> {
    Ok(run_dir()?.join("client.sock"))
}

/// Returns the default command socket path for a domain's consumer daemon.
pub fn consumer_cmd_sock_path(domain: crate::domain::TraceDomain) -> Result<PathBuf> {
    Ok(run_dir()?.join(format!("consumerd-{}-cmd.sock", domain.short_name())))
}

/// Returns the default error socket path for a domain's consumer daemon.
pub fn consumer_err_sock_path(domain: crate::domain::TraceDomain) -> Result<PathBuf> {
    Ok(run_dir()?.join(format!("consumerd-{}-err.sock", domain.short_name())))
}

/// Returns the daemon singleton lock file path.
pub fn lock_file_path() -> Result<PathBuf> {
    Ok(run_dir()?.join("spoord.lock"))
}

/// Returns the default trace output directory for a session:
/// `$HOME/spoor-traces/<session>-<timestamp>`.
pub fn default_trace_dir(session_name: &str) -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory for trace output")?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    Ok(home
        .join("spoor-traces")
        .join(format!("{}-{}", session_name, stamp)))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod paths_tests;
