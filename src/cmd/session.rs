//! Session lifecycle commands: create, destroy, start, stop, listings.

use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::consumer::protocol::ConsumerMessage;
use crate::context::DaemonContext;
use crate::error::{CommandError, CommandResult};
use crate::health::HealthStatus;
use crate::notification::NotificationEvent;
use crate::paths;
use crate::session::{Channel, ChannelAttr, Session, SessionState, SessionSummary};

use super::{output, rotation, CompletionHandler};

/// Reserved channel carrying trace metadata; registered implicitly at start.
pub const METADATA_CHANNEL: &str = "metadata";

/// Stream keys are derived from their channel key; this bounds the streams
/// of one channel.
const STREAMS_PER_CHANNEL: u64 = 256;

/// Creates a session. The default output is a timestamped directory under
/// the invoking user's home.
pub async fn create_session(
    ctx: &Arc<DaemonContext>,
    name: &str,
    output_path: Option<PathBuf>,
) -> CommandResult<(SessionSummary, Option<CompletionHandler>)> {
    if name.is_empty() || name.contains('/') {
        return Err(CommandError::invalid_state(
            "session name must be non-empty and must not contain '/'",
        ));
    }

    let output = match output_path {
        Some(path) => crate::consumer::ConsumerOutput::local(path),
        None => {
            let path = paths::default_trace_dir(name).map_err(|e| {
                CommandError::ResourceExhausted {
                    message: format!("cannot derive trace output directory: {}", e),
                }
            })?;
            crate::consumer::ConsumerOutput::local(path)
        }
    };

    let handle = ctx.registry.create(Session::new(name.to_string(), output)).await?;
    let summary = handle.lock().await.summary();
    info!(session = name, "session created");

    Ok((
        summary,
        Some(CompletionHandler::notify(NotificationEvent::SessionCreated {
            session: name.to_string(),
        })),
    ))
}

/// Destroys a session once nothing is pending on it, releasing every
/// consumer-side resource before the registry entry disappears.
pub async fn destroy_session(
    ctx: &Arc<DaemonContext>,
    name: &str,
) -> CommandResult<Option<CompletionHandler>> {
    let handle = ctx.registry.lookup(name).await?;
    {
        let mut s = handle.lock().await;
        if !s.state.can_destroy() {
            return Err(CommandError::invalid_state(
                "session is already being destroyed",
            ));
        }
        if s.rotation.is_pending() {
            return Err(CommandError::busy("rotation in progress"));
        }
        if s.snapshot_in_progress {
            return Err(CommandError::busy("snapshot in progress"));
        }

        if s.state == SessionState::Active {
            finalize_active(ctx, &mut s).await?;
        }
        s.state = SessionState::Destroying;

        if let Some(timer) = s.rotation_timer.take() {
            let _ = timer.send(true);
        }

        if let Err(e) = teardown_consumer_channels(ctx, &mut s).await {
            // Channels already released stay released; the session keeps the
            // state it last reached so the client can retry the destroy.
            s.state = SessionState::Stopped;
            return Err(e);
        }
    }
    ctx.registry.remove(name).await?;
    info!(session = name, "session destroyed");

    Ok(Some(CompletionHandler::notify(
        NotificationEvent::SessionDestroyed {
            session: name.to_string(),
        },
    )))
}

/// Starts tracing: validates, connects relays where needed, registers every
/// enabled channel and its streams with the domain consumers, then flips the
/// session active. Re-entrant start on an active session succeeds without a
/// second consumer attach.
pub async fn start_trace(ctx: &Arc<DaemonContext>, name: &str) -> CommandResult<()> {
    let handle = ctx.registry.lookup(name).await?;
    let mut s = handle.lock().await;

    if s.state == SessionState::Active {
        return Ok(());
    }
    if !s.state.can_start() {
        return Err(CommandError::invalid_state(format!(
            "cannot start a session in state '{}'",
            s.state
        )));
    }
    if s.domains.is_empty() {
        return Err(CommandError::invalid_state(
            "session has no domain attached",
        ));
    }
    // Validate every output before any consumer or relay exchange.
    for d in &s.domains {
        if d.output.is_net() && !d.output.network_ready() {
            return Err(CommandError::invalid_state(format!(
                "domain '{}' output is missing a network endpoint",
                d.domain
            )));
        }
    }

    output::setup_relay_locked(ctx, &mut s).await?;

    // Every domain carries an implicit metadata channel.
    let missing_metadata: Vec<usize> = s
        .domains
        .iter()
        .enumerate()
        .filter(|(_, d)| d.channel(METADATA_CHANNEL).is_none())
        .map(|(index, _)| index)
        .collect();
    for index in missing_metadata {
        let key = s.allocate_channel_key();
        s.domains[index].channels.push(Channel {
            key,
            name: METADATA_CHANNEL.to_string(),
            enabled: true,
            attr: ChannelAttr {
                stream_count: 1,
                ..ChannelAttr::default()
            },
            events: Vec::new(),
            contexts: Vec::new(),
            registered: false,
        });
    }

    attach_consumers(ctx, &mut s).await?;
    s.state = SessionState::Active;
    info!(session = %s.name, "tracing started");
    Ok(())
}

/// Stops tracing. Waits out a pending rotation first, then closes the open
/// chunk when chunk mode was in use, so the final chunk is never truncated.
/// Re-entrant stop on an inactive session succeeds.
pub async fn stop_trace(ctx: &Arc<DaemonContext>, name: &str) -> CommandResult<()> {
    let handle = ctx.registry.lookup(name).await?;
    loop {
        let mut s = handle.lock().await;
        match s.state {
            SessionState::Inactive | SessionState::Stopped => return Ok(()),
            SessionState::Destroying => {
                return Err(CommandError::invalid_state("session is being destroyed"));
            }
            SessionState::Active => {}
        }

        if s.rotation.is_pending() {
            let done = s.rotation_done.clone();
            drop(s);
            done.notified().await;
            continue;
        }

        finalize_active(ctx, &mut s).await?;
        info!(session = %s.name, "tracing stopped");
        return Ok(());
    }
}

/// Lists the domains attached to a session.
pub async fn list_domains(ctx: &Arc<DaemonContext>, name: &str) -> CommandResult<Vec<String>> {
    let handle = ctx.registry.lookup(name).await?;
    let s = handle.lock().await;
    Ok(s.domains
        .iter()
        .map(|d| d.domain.short_name().to_string())
        .collect())
}

/// Asks every attached consumer whether trace data is still buffered.
/// Meaningful only once the session is stopped.
pub async fn data_pending(ctx: &Arc<DaemonContext>, name: &str) -> CommandResult<bool> {
    let handle = ctx.registry.lookup(name).await?;
    let s = handle.lock().await;
    if s.state != SessionState::Stopped {
        return Err(CommandError::invalid_state(
            "data-pending requires a stopped session",
        ));
    }
    for d in &s.domains {
        let keys: Vec<u64> = d
            .channels
            .iter()
            .filter(|c| c.registered)
            .map(|c| c.key)
            .collect();
        if keys.is_empty() {
            continue;
        }
        let consumer = ctx.consumer(d.domain)?;
        for key in keys {
            let pending = consumer.with_client(|c| c.data_pending(key)).await?;
            if pending {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Final flush of an active session: one last rotation when chunk mode was
/// used, then the stopped state.
async fn finalize_active(ctx: &Arc<DaemonContext>, s: &mut Session) -> CommandResult<()> {
    if s.rotation.last_completed().is_some() {
        let id = s.rotation.begin()?;
        let work = rotation::collect_rotation_work(s, id);
        match rotation::do_rotate_exchange(ctx, &work).await {
            Ok(()) => {
                s.rotation.complete(id, work.chunk_path.clone());
            }
            Err(e) => {
                s.rotation.fail(id);
                s.rotation_done.notify_waiters();
                return Err(e);
            }
        }
        s.rotation_done.notify_waiters();
    }
    s.state = SessionState::Stopped;
    Ok(())
}

/// One channel's attach work, collected under the lock before any exchange.
struct AttachWork {
    domain_index: usize,
    channel_index: usize,
    domain: crate::domain::TraceDomain,
    key: u64,
    name: String,
    attr: ChannelAttr,
    metadata: bool,
    net_index: Option<u64>,
    domain_path: String,
}

/// Registers every enabled, not-yet-registered channel (and its streams)
/// with the domain consumers. Ring-buffer descriptors come from the tracer
/// back-end and are handed off with the stream message.
async fn attach_consumers(ctx: &Arc<DaemonContext>, s: &mut Session) -> CommandResult<()> {
    let uid = s.uid;
    let gid = s.gid;

    let mut work = Vec::new();
    for (domain_index, d) in s.domains.iter().enumerate() {
        // Stale health is advisory only: still attempt the exchange and let
        // the socket fail fast if the consumer really is gone.
        if ctx.health.report(d.domain.health_subsystem()) == HealthStatus::Unhealthy {
            warn!(session = %s.name, domain = %d.domain,
                "consumer reported unhealthy, attempting attach anyway");
        }
        let domain_path = d.output.domain_pathname(d.domain);
        for (channel_index, channel) in d.channels.iter().enumerate() {
            if !channel.enabled || channel.registered {
                continue;
            }
            work.push(AttachWork {
                domain_index,
                channel_index,
                domain: d.domain,
                key: channel.key,
                name: channel.name.clone(),
                attr: channel.attr.clone(),
                metadata: channel.name == METADATA_CHANNEL,
                net_index: d.output.net_seq_index,
                domain_path: domain_path.clone(),
            });
        }
    }

    for item in work {
        let consumer = ctx.consumer(item.domain)?;
        let buffers = ctx
            .tracer
            .create_channel_buffers(item.domain, &item.name, &item.attr)?;

        let msg = ConsumerMessage::channel(
            item.key,
            &item.name,
            &item.domain_path,
            item.attr.output,
            buffers.max_subbuf_size,
            buffers.mmap_len,
            uid,
            gid,
        );
        consumer.with_client(|c| c.send_channel(&msg)).await?;

        for (index, fd) in buffers.stream_fds.iter().enumerate() {
            let stream_key = item.key * STREAMS_PER_CHANNEL + index as u64;
            let stream_name = format!("{}_{}", item.name, index);
            let msg = ConsumerMessage::stream(
                item.key,
                stream_key,
                true,
                item.attr.output,
                buffers.mmap_len,
                uid,
                gid,
                item.net_index,
                item.metadata,
                &stream_name,
                &item.domain_path,
            );
            consumer
                .with_client(|c| c.send_stream(&msg, fd.as_raw_fd()))
                .await?;
        }
        s.domains[item.domain_index].channels[item.channel_index].registered = true;
    }
    Ok(())
}

/// Tears down every registered channel on the consumer side. Channels are
/// unregistered one by one so a retried destroy only has the remainder left.
async fn teardown_consumer_channels(
    ctx: &Arc<DaemonContext>,
    s: &mut Session,
) -> CommandResult<()> {
    let mut work = Vec::new();
    for (domain_index, d) in s.domains.iter().enumerate() {
        for (channel_index, channel) in d.channels.iter().enumerate() {
            if channel.registered {
                work.push((domain_index, channel_index, d.domain, channel.key));
            }
        }
    }

    for (domain_index, channel_index, domain, key) in work {
        let consumer = ctx.consumer(domain)?;
        let msg = ConsumerMessage::destroy_channel(key);
        consumer.with_client(|c| c.command(&msg)).await?;
        s.domains[domain_index].channels[channel_index].registered = false;
    }
    Ok(())
}
