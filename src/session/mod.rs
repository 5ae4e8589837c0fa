//! Session model: a named tracing configuration spanning domains.
//!
//! A session owns its channels, one consumer output per attached domain,
//! rotation bookkeeping and snapshot outputs. All mutation happens through
//! the command layer while the per-session lock is held; this module only
//! defines the data and its local invariants.

pub mod registry;
pub mod rotation;
pub mod state;

pub use registry::SessionRegistry;
pub use rotation::{RotationInfo, RotationInfoState, RotationRecord, RotationSchedule};
pub use state::SessionState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::consumer::output::ConsumerOutput;
use crate::consumer::protocol::OutputKind;
use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};

/// Buffer sizing of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAttr {
    /// Size of one sub-buffer, in bytes.
    #[serde(default = "default_subbuf_size")]
    pub subbuf_size: u64,
    /// Number of sub-buffers per stream.
    #[serde(default = "default_subbuf_count")]
    pub subbuf_count: u64,
    /// Streams backing the channel.
    #[serde(default = "default_stream_count")]
    pub stream_count: u32,
    /// How consumers extract events.
    #[serde(default)]
    pub output: OutputKind,
}

impl Default for ChannelAttr {
    fn default() -> Self {
        Self {
            subbuf_size: default_subbuf_size(),
            subbuf_count: default_subbuf_count(),
            stream_count: default_stream_count(),
            output: OutputKind::default(),
        }
    }
}

fn default_subbuf_size() -> u64 {
    256 * 1024
}

fn default_subbuf_count() -> u64 {
    4
}

fn default_stream_count() -> u32 {
    1
}

/// Event context types attachable to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Pid,
    Tid,
    ProcName,
    Prio,
    Nice,
    Hostname,
}

/// An instrumented event within a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub enabled: bool,
    /// Filter expression attached to the event; compilation to bytecode is
    /// the tracer's business.
    pub filter: Option<String>,
}

/// A channel and everything it owns.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Key identifying the channel towards consumers.
    pub key: u64,
    pub name: String,
    pub enabled: bool,
    pub attr: ChannelAttr,
    pub events: Vec<TraceEvent>,
    pub contexts: Vec<ContextType>,
    /// Whether the channel has been registered with its domain's consumer.
    pub registered: bool,
}

impl Channel {
    pub fn event(&self, name: &str) -> Option<&TraceEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn event_mut(&mut self, name: &str) -> Option<&mut TraceEvent> {
        self.events.iter_mut().find(|e| e.name == name)
    }
}

/// Per-domain slice of a session.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub domain: TraceDomain,
    pub channels: Vec<Channel>,
    pub output: ConsumerOutput,
}

impl DomainState {
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.name == name)
    }
}

/// A snapshot destination registered on a session.
#[derive(Debug, Clone)]
pub struct SnapshotOutput {
    pub id: u32,
    pub name: String,
    pub output: ConsumerOutput,
}

/// A named, client-controlled tracing configuration.
#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Owning user and group of the session.
    pub uid: u32,
    pub gid: u32,
    pub state: SessionState,
    pub domains: Vec<DomainState>,
    pub rotation: RotationRecord,
    /// Set for the span of a snapshot record; guards the output against
    /// concurrent mutation and destroy.
    pub snapshot_in_progress: bool,
    pub snapshot_outputs: Vec<SnapshotOutput>,
    /// Output template copied to each newly attached domain.
    pub base_output: ConsumerOutput,
    /// Stop signal of the periodic rotation timer, when one is running.
    pub rotation_timer: Option<watch::Sender<bool>>,
    /// Signalled every time a pending rotation settles; stop waits on this.
    pub rotation_done: Arc<Notify>,
    next_channel_key: u64,
    next_snapshot_id: u32,
}

impl Session {
    pub fn new(name: String, base_output: ConsumerOutput) -> Self {
        Self {
            name,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            state: SessionState::Inactive,
            domains: Vec::new(),
            rotation: RotationRecord::new(),
            snapshot_in_progress: false,
            snapshot_outputs: Vec::new(),
            base_output,
            rotation_timer: None,
            rotation_done: Arc::new(Notify::new()),
            next_channel_key: 1,
            next_snapshot_id: 1,
        }
    }

    pub fn domain(&self, domain: TraceDomain) -> Option<&DomainState> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    pub fn domain_mut(&mut self, domain: TraceDomain) -> Option<&mut DomainState> {
        self.domains.iter_mut().find(|d| d.domain == domain)
    }

    /// Attaches a domain if absent, seeding its output from the session's
    /// template, and returns it.
    pub fn attach_domain(&mut self, domain: TraceDomain) -> &mut DomainState {
        if let Some(index) = self.domains.iter().position(|d| d.domain == domain) {
            return &mut self.domains[index];
        }
        self.domains.push(DomainState {
            domain,
            channels: Vec::new(),
            output: self.base_output.clone(),
        });
        self.domains.last_mut().expect("just pushed")
    }

    pub fn allocate_channel_key(&mut self) -> u64 {
        let key = self.next_channel_key;
        self.next_channel_key += 1;
        key
    }

    pub fn allocate_snapshot_id(&mut self) -> u32 {
        let id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        id
    }

    /// The consumer output may not change while a rotation or snapshot is
    /// in progress.
    pub fn output_mutable(&self) -> CommandResult<()> {
        if self.rotation.is_pending() {
            return Err(CommandError::busy("rotation in progress"));
        }
        if self.snapshot_in_progress {
            return Err(CommandError::busy("snapshot in progress"));
        }
        Ok(())
    }

    /// Read-only snapshot for listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            name: self.name.clone(),
            id: self.id,
            state: self.state,
            created_at: self.created_at,
            domains: self
                .domains
                .iter()
                .map(|d| d.domain.short_name().to_string())
                .collect(),
            output: self.base_output.describe(),
            rotation_schedule: self.rotation.schedule,
        }
    }
}

/// Listing view of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub name: String,
    pub id: Uuid,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub domains: Vec<String>,
    pub output: String,
    pub rotation_schedule: RotationSchedule,
}

/// Listing view of one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub enabled: bool,
    pub attr: ChannelAttr,
    pub event_count: usize,
    pub contexts: Vec<ContextType>,
}

impl ChannelInfo {
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            name: channel.name.clone(),
            enabled: channel.enabled,
            attr: channel.attr.clone(),
            event_count: channel.events.len(),
            contexts: channel.contexts.clone(),
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
