//! Session lifecycle states.
//!
//! Transitions: `Inactive → Active` on start (needs at least one attached
//! domain), `Active → Stopped` on stop, and `Inactive | Stopped →
//! Destroying` on destroy; an active session gets an implicit stop first.
//! Re-entrant start/stop on an already-correct state succeeds without doing
//! anything, so client retries are harmless.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, never started (or not yet restarted)
    Inactive,
    /// Tracing; consumers are attached and streams are live
    Active,
    /// Was active, stopped; may be restarted or destroyed
    Stopped,
    /// Being torn down; no further commands are accepted
    Destroying,
}

impl SessionState {
    /// Start is legal from here (idempotent re-entry handled separately).
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Inactive | SessionState::Stopped)
    }

    /// Destroy is legal from here; `Active` first gets an implicit stop.
    pub fn can_destroy(self) -> bool {
        !matches!(self, SessionState::Destroying)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Inactive => f.write_str("inactive"),
            SessionState::Active => f.write_str("active"),
            SessionState::Stopped => f.write_str("stopped"),
            SessionState::Destroying => f.write_str("destroying"),
        }
    }
}
