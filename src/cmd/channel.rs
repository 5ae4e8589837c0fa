//! Channel and event commands.
//!
//! These mutate the session's configuration only; consumers learn about
//! channels when the session starts. Enabling an existing channel or event
//! again is idempotent.

use std::sync::Arc;

use crate::context::DaemonContext;
use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};
use crate::session::{Channel, ChannelAttr, ChannelInfo, ContextType, SessionState, TraceEvent};

use super::session::METADATA_CHANNEL;

/// Enables a channel, attaching the domain on first use. New channels
/// cannot be added while the session is active; re-enabling an existing one
/// is always allowed.
pub async fn enable_channel(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    name: &str,
    attr: Option<ChannelAttr>,
) -> CommandResult<()> {
    if name.is_empty() {
        return Err(CommandError::invalid_state("channel name must not be empty"));
    }
    if name == METADATA_CHANNEL {
        return Err(CommandError::invalid_state(format!(
            "channel name '{}' is reserved",
            METADATA_CHANNEL
        )));
    }

    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    if s.state == SessionState::Destroying {
        return Err(CommandError::invalid_state("session is being destroyed"));
    }

    if let Some(existing) = s.domain_mut(domain).and_then(|d| d.channel_mut(name)) {
        existing.enabled = true;
        return Ok(());
    }

    if s.state == SessionState::Active {
        return Err(CommandError::invalid_state(
            "cannot add a channel to an active session",
        ));
    }

    let key = s.allocate_channel_key();
    let domain_state = s.attach_domain(domain);
    domain_state.channels.push(Channel {
        key,
        name: name.to_string(),
        enabled: true,
        attr: attr.unwrap_or_default(),
        events: Vec::new(),
        contexts: Vec::new(),
        registered: false,
    });
    Ok(())
}

/// Disables a channel without forgetting its configuration.
pub async fn disable_channel(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    name: &str,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    let channel = s
        .domain_mut(domain)
        .and_then(|d| d.channel_mut(name))
        .ok_or_else(|| CommandError::not_found(format!("channel '{}'", name)))?;
    channel.enabled = false;
    Ok(())
}

/// Enables an event within a channel, creating it on first mention.
pub async fn enable_event(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    channel: &str,
    name: &str,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    let chan = s
        .domain_mut(domain)
        .and_then(|d| d.channel_mut(channel))
        .ok_or_else(|| CommandError::not_found(format!("channel '{}'", channel)))?;

    if let Some(event) = chan.event_mut(name) {
        event.enabled = true;
        return Ok(());
    }
    chan.events.push(TraceEvent {
        name: name.to_string(),
        enabled: true,
        filter: None,
    });
    Ok(())
}

/// Disables an event. Unknown events are an error, not a silent no-op.
pub async fn disable_event(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    channel: &str,
    name: &str,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    let chan = s
        .domain_mut(domain)
        .and_then(|d| d.channel_mut(channel))
        .ok_or_else(|| CommandError::not_found(format!("channel '{}'", channel)))?;
    let event = chan
        .event_mut(name)
        .ok_or_else(|| CommandError::not_found(format!("event '{}'", name)))?;
    event.enabled = false;
    Ok(())
}

/// Attaches a context type to a channel; attaching it twice is harmless.
pub async fn add_context(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    channel: &str,
    context: ContextType,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    let chan = s
        .domain_mut(domain)
        .and_then(|d| d.channel_mut(channel))
        .ok_or_else(|| CommandError::not_found(format!("channel '{}'", channel)))?;
    if !chan.contexts.contains(&context) {
        chan.contexts.push(context);
    }
    Ok(())
}

/// Stores a filter expression on an event. Compiling it to bytecode is the
/// tracer's business; the expression is kept verbatim.
pub async fn set_event_filter(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    channel: &str,
    event: &str,
    expression: String,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    let chan = s
        .domain_mut(domain)
        .and_then(|d| d.channel_mut(channel))
        .ok_or_else(|| CommandError::not_found(format!("channel '{}'", channel)))?;
    let ev = chan
        .event_mut(event)
        .ok_or_else(|| CommandError::not_found(format!("event '{}'", event)))?;
    ev.filter = Some(expression);
    Ok(())
}

/// Lists the channels of a domain; an unattached domain lists empty.
pub async fn list_channels(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
) -> CommandResult<Vec<ChannelInfo>> {
    let handle = ctx.registry.lookup(session).await?;
    let s = handle.lock().await;
    Ok(s.domain(domain)
        .map(|d| d.channels.iter().map(ChannelInfo::from_channel).collect())
        .unwrap_or_default())
}

/// Lists the events of a channel.
pub async fn list_events(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    channel: &str,
) -> CommandResult<Vec<TraceEvent>> {
    let handle = ctx.registry.lookup(session).await?;
    let s = handle.lock().await;
    let chan = s
        .domain(domain)
        .and_then(|d| d.channel(channel))
        .ok_or_else(|| CommandError::not_found(format!("channel '{}'", channel)))?;
    Ok(chan.events.clone())
}
