//! Trigger registration commands.
//!
//! Triggers are daemon-wide, not per-session. The dispatcher only maintains
//! the registration set; rule evaluation lives in the notification
//! subsystem, which learns about both operations through the completion
//! handler.

use std::sync::Arc;

use crate::context::DaemonContext;
use crate::error::{CommandError, CommandResult};
use crate::notification::NotificationEvent;

use super::CompletionHandler;

pub async fn register_trigger(
    ctx: &Arc<DaemonContext>,
    name: &str,
) -> CommandResult<Option<CompletionHandler>> {
    if name.is_empty() {
        return Err(CommandError::invalid_state("trigger name must not be empty"));
    }
    ctx.register_trigger(name).await?;
    Ok(Some(CompletionHandler::notify(
        NotificationEvent::TriggerRegistered {
            name: name.to_string(),
        },
    )))
}

pub async fn unregister_trigger(
    ctx: &Arc<DaemonContext>,
    name: &str,
) -> CommandResult<Option<CompletionHandler>> {
    ctx.unregister_trigger(name).await?;
    Ok(Some(CompletionHandler::notify(
        NotificationEvent::TriggerUnregistered {
            name: name.to_string(),
        },
    )))
}
