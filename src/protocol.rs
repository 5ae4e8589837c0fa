//! Client control protocol types.
//!
//! Requests and replies exchanged with trace clients over the daemon's
//! control socket, as newline-delimited JSON (one object per line,
//! persistent connections). Command-line parsing and presentation-layer
//! formatting are the client's business; this is the daemon's ingress
//! surface.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::TraceDomain;
use crate::error::CommandError;
use crate::session::{
    ChannelAttr, ChannelInfo, ContextType, RotationInfo, SessionSummary, TraceEvent,
};
use crate::uri::StreamRole;

/// Which automatic rotation trigger a schedule command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Periodic,
    Size,
}

/// Requests accepted on the client control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientRequest {
    CreateSession {
        name: String,
        #[serde(default)]
        output_path: Option<PathBuf>,
    },
    DestroySession {
        name: String,
    },
    ListSessions,
    EnableChannel {
        session: String,
        domain: TraceDomain,
        name: String,
        #[serde(default)]
        attr: Option<ChannelAttr>,
    },
    DisableChannel {
        session: String,
        domain: TraceDomain,
        name: String,
    },
    EnableEvent {
        session: String,
        domain: TraceDomain,
        channel: String,
        name: String,
    },
    DisableEvent {
        session: String,
        domain: TraceDomain,
        channel: String,
        name: String,
    },
    AddContext {
        session: String,
        domain: TraceDomain,
        channel: String,
        context: ContextType,
    },
    SetEventFilter {
        session: String,
        domain: TraceDomain,
        channel: String,
        event: String,
        expression: String,
    },
    Start {
        session: String,
    },
    Stop {
        session: String,
    },
    SetConsumerUri {
        session: String,
        domain: TraceDomain,
        role: StreamRole,
        uri: String,
    },
    SetupRelay {
        session: String,
    },
    RegisterConsumer {
        domain: TraceDomain,
        cmd_sock_path: PathBuf,
    },
    SnapshotAddOutput {
        session: String,
        name: String,
        #[serde(default)]
        output_path: Option<PathBuf>,
        #[serde(default)]
        control_uri: Option<String>,
        #[serde(default)]
        data_uri: Option<String>,
    },
    SnapshotDelOutput {
        session: String,
        id: u32,
    },
    SnapshotListOutputs {
        session: String,
    },
    SnapshotRecord {
        session: String,
        #[serde(default)]
        output_path: Option<PathBuf>,
    },
    Rotate {
        session: String,
    },
    RotationInfo {
        session: String,
        rotation_id: u64,
    },
    SetRotationSchedule {
        session: String,
        enable: bool,
        kind: ScheduleKind,
        #[serde(default)]
        value: u64,
    },
    /// Reported by the consumer-metrics collaborator when a size-triggered
    /// session crossed its chunk threshold.
    SizeThresholdReached {
        session: String,
    },
    RegisterTrigger {
        name: String,
    },
    UnregisterTrigger {
        name: String,
    },
    ListDomains {
        session: String,
    },
    ListChannels {
        session: String,
        domain: TraceDomain,
    },
    ListEvents {
        session: String,
        domain: TraceDomain,
        channel: String,
    },
    ListTracepoints {
        domain: TraceDomain,
    },
    DataPending {
        session: String,
    },
    Version,
}

/// Listing view of a snapshot output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOutputInfo {
    pub id: u32,
    pub name: String,
    pub destination: String,
}

/// Replies sent back to clients. Every command yields exactly one reply;
/// listing replies carry an empty collection when nothing matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientReply {
    Ok,
    Error(CommandError),
    Session(SessionSummary),
    Sessions(Vec<SessionSummary>),
    Rotation { rotation_id: u64 },
    RotationInfo(RotationInfo),
    Domains(Vec<String>),
    Channels(Vec<ChannelInfo>),
    Events(Vec<TraceEvent>),
    Tracepoints(Vec<String>),
    SnapshotOutputAdded { id: u32 },
    SnapshotOutputs(Vec<SnapshotOutputInfo>),
    DataPending { pending: bool },
    Version { version: String, git_sha: String },
}

impl ClientReply {
    /// Collapses a unit command result into a reply.
    pub fn from_unit(result: Result<(), CommandError>) -> Self {
        match result {
            Ok(()) => ClientReply::Ok,
            Err(e) => ClientReply::Error(e),
        }
    }
}
