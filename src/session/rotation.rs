//! Rotation bookkeeping and the periodic trigger task.
//!
//! A rotation closes the current trace chunk of every channel in a session
//! and opens the next one, without stopping tracing. Requests are coalesced:
//! while one rotation is pending, further requests observe `Busy` rather
//! than queueing. Only the last two rotation ids are retained.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::context::DaemonContext;
use crate::error::{CommandError, CommandResult};

/// When a rotation is triggered automatically.
///
/// The two trigger modes are mutually exclusive per session. Periodic
/// disablement is expressed by this variant, never by a sentinel interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RotationSchedule {
    /// No automatic rotation
    Disabled,
    /// Rotate every `interval_secs` seconds
    Periodic { interval_secs: u64 },
    /// Rotate when consumers report this many bytes written to the chunk
    SizeThreshold { bytes: u64 },
}

/// Client-visible state of one rotation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationInfoState {
    Pending,
    Completed,
    Error,
}

/// Reply payload of a rotation-info query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationInfo {
    pub state: RotationInfoState,
    /// Path of the finalized chunk, present once completed.
    pub chunk_path: Option<String>,
}

/// Per-session rotation record.
#[derive(Debug)]
pub struct RotationRecord {
    /// Id handed to the next rotation; ids start at 1.
    next_id: u64,
    pending: Option<u64>,
    last_completed: Option<u64>,
    last_failed: Option<u64>,
    completed_chunk: Option<PathBuf>,
    pub schedule: RotationSchedule,
}

impl Default for RotationRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationRecord {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: None,
            last_completed: None,
            last_failed: None,
            completed_chunk: None,
            schedule: RotationSchedule::Disabled,
        }
    }

    /// Allocates the next rotation id, or `Busy` while one is pending.
    pub fn begin(&mut self) -> CommandResult<u64> {
        if let Some(pending) = self.pending {
            return Err(CommandError::busy(format!(
                "rotation {} already in progress",
                pending
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some(id);
        Ok(id)
    }

    /// Marks the pending rotation completed and records its chunk path.
    pub fn complete(&mut self, id: u64, chunk_path: PathBuf) {
        debug_assert_eq!(self.pending, Some(id));
        self.pending = None;
        self.last_completed = Some(id);
        self.completed_chunk = Some(chunk_path);
    }

    /// Marks the pending rotation failed.
    pub fn fail(&mut self, id: u64) {
        debug_assert_eq!(self.pending, Some(id));
        self.pending = None;
        self.last_failed = Some(id);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_completed(&self) -> Option<u64> {
        self.last_completed
    }

    /// Looks up the state of a rotation id. Ids older than the last two are
    /// not retained and report `NotFound` at the command layer.
    pub fn info(&self, id: u64) -> Option<RotationInfo> {
        if self.pending == Some(id) {
            return Some(RotationInfo {
                state: RotationInfoState::Pending,
                chunk_path: None,
            });
        }
        if self.last_completed == Some(id) {
            return Some(RotationInfo {
                state: RotationInfoState::Completed,
                chunk_path: self
                    .completed_chunk
                    .as_ref()
                    .map(|p| p.display().to_string()),
            });
        }
        if self.last_failed == Some(id) {
            return Some(RotationInfo {
                state: RotationInfoState::Error,
                chunk_path: None,
            });
        }
        None
    }

    /// Directory name of a chunk, relative to the session output.
    pub fn chunk_dir_name(id: u64) -> String {
        format!("archives/chunk-{:06}", id)
    }
}

/// Spawns the periodic rotation trigger for a session.
///
/// The task rotates the session on every tick until told to stop through
/// the returned sender (dropping it stops the task too). `Busy` ticks are
/// coalesced into the in-flight rotation; a vanished session ends the task.
pub fn spawn_periodic_timer(
    ctx: Arc<DaemonContext>,
    session_name: String,
    interval: Duration,
) -> watch::Sender<bool> {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; swallow the first tick.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match crate::cmd::rotation::rotate_session(&ctx, &session_name).await {
                        Ok(id) => {
                            debug!(session = %session_name, rotation_id = id,
                                "periodic rotation triggered");
                        }
                        Err(CommandError::Busy { .. }) => {
                            // Previous rotation still pending; coalesce.
                        }
                        Err(CommandError::NotFound { .. }) => break,
                        Err(CommandError::InvalidState { .. }) => {
                            // Session not active right now; keep the schedule.
                        }
                        Err(e) => {
                            warn!(session = %session_name, error = %e,
                                "periodic rotation failed");
                        }
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(session = %session_name, "rotation timer stopped");
    });
    stop_tx
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod rotation_tests;
