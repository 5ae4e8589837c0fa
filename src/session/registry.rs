//! Authoritative collection of sessions.
//!
//! The registry is the only daemon-wide index of sessions, keyed by name.
//! Entries are `Arc<Mutex<Session>>`: the map lock is held just long enough
//! to resolve a name, then commands serialize on the per-session lock, so
//! commands against different sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{CommandError, CommandResult};

use super::{Session, SessionSummary};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Lock-protected session index.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new session; names are unique.
    pub async fn create(&self, session: Session) -> CommandResult<SessionHandle> {
        let name = session.name.clone();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&name) {
            return Err(CommandError::AlreadyExists {
                what: format!("session '{}'", name),
            });
        }
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(name, handle.clone());
        Ok(handle)
    }

    /// Resolves a session by name.
    pub async fn lookup(&self, name: &str) -> CommandResult<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions
            .get(name)
            .cloned()
            .ok_or_else(|| CommandError::not_found(format!("session '{}'", name)))
    }

    /// Removes a session entry. The caller has already validated the
    /// destroy against the session's own state.
    pub async fn remove(&self, name: &str) -> CommandResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CommandError::not_found(format!("session '{}'", name)))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Names of all sessions, unordered.
    pub async fn names(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Consistent listing snapshot.
    ///
    /// Holds the map read lock across the copy and takes each per-session
    /// lock for the duration of its snapshot, so a listing never observes a
    /// partially-applied mutation from a concurrent write command.
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries = Vec::with_capacity(sessions.len());
        for handle in sessions.values() {
            let session = handle.lock().await;
            summaries.push(session.summary());
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
