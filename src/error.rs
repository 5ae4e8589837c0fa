//! Error taxonomy for session commands.
//!
//! Every command returns exactly one of these codes to the client. Validation
//! failures are reported before any mutation or consumer I/O takes place;
//! consumer-communication failures leave the session in the last state it
//! reached and name the failing step.

use serde::{Deserialize, Serialize};

/// Errors returned by session commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandError {
    /// Session, channel, event or output does not exist
    NotFound { what: String },
    /// Session or output with this name/id already exists
    AlreadyExists { what: String },
    /// Operation is illegal from the current lifecycle state
    InvalidState { message: String },
    /// A conflicting operation is in flight (e.g. rotation already pending)
    Busy { message: String },
    /// Malformed trace URI or control/data destination host mismatch
    InvalidDestination { message: String },
    /// Socket error, partial write or unexpected reply from a consumer daemon
    ConsumerCommunication { message: String },
    /// Descriptor or allocation exhaustion
    ResourceExhausted { message: String },
    /// A post-commit completion handler failed; this supersedes the command's
    /// own result in the client-visible reply
    CompletionHandlerFailed { message: String },
}

impl CommandError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        CommandError::NotFound { what: what.into() }
    }

    /// Shorthand for an `InvalidState` error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        CommandError::InvalidState {
            message: message.into(),
        }
    }

    /// Shorthand for a `Busy` error.
    pub fn busy(message: impl Into<String>) -> Self {
        CommandError::Busy {
            message: message.into(),
        }
    }

    /// Wraps a consumer socket failure, naming the failing step.
    pub fn consumer(step: &str, err: impl std::fmt::Display) -> Self {
        CommandError::ConsumerCommunication {
            message: format!("{}: {}", step, err),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotFound { what } => write!(f, "not found: {}", what),
            CommandError::AlreadyExists { what } => write!(f, "already exists: {}", what),
            CommandError::InvalidState { message } => write!(f, "invalid state: {}", message),
            CommandError::Busy { message } => write!(f, "busy: {}", message),
            CommandError::InvalidDestination { message } => {
                write!(f, "invalid destination: {}", message)
            }
            CommandError::ConsumerCommunication { message } => {
                write!(f, "consumer communication failure: {}", message)
            }
            CommandError::ResourceExhausted { message } => {
                write!(f, "resource exhausted: {}", message)
            }
            CommandError::CompletionHandlerFailed { message } => {
                write!(f, "completion handler failed: {}", message)
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Result type for session commands.
pub type CommandResult<T> = Result<T, CommandError>;
