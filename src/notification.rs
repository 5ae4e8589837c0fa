//! Notification bridge contract.
//!
//! The command dispatcher informs an external notification subsystem of
//! session and trigger registration changes. Only the call contract lives
//! here; rule evaluation belongs to that subsystem. The daemon ships a
//! channel-backed bridge that forwards events to a receiver owned by the
//! collaborator.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{CommandError, CommandResult};
use crate::session::rotation::RotationSchedule;

/// Events forwarded to the notification subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    SessionCreated {
        session: String,
    },
    SessionDestroyed {
        session: String,
    },
    TriggerRegistered {
        name: String,
    },
    TriggerUnregistered {
        name: String,
    },
    RotationScheduleChanged {
        session: String,
        schedule: RotationSchedule,
    },
}

/// Call contract towards the notification subsystem.
pub trait NotificationBridge: Send + Sync {
    /// Delivers one event. Runs as a command's completion handler, so a
    /// failure here becomes the command's client-visible error.
    fn notify(&self, event: NotificationEvent) -> CommandResult<()>;
}

/// Bridge forwarding events over an unbounded channel.
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelBridge {
    /// Creates the bridge and the receiver end handed to the collaborator.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationBridge for ChannelBridge {
    fn notify(&self, event: NotificationEvent) -> CommandResult<()> {
        self.tx
            .send(event)
            .map_err(|_| CommandError::CompletionHandlerFailed {
                message: "notification subsystem is gone".to_string(),
            })
    }
}
