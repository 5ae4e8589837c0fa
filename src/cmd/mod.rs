//! Command dispatch.
//!
//! One function per exported command. Each command resolves its target
//! session under the registry lock, validates the requested transition
//! against the session's current state, performs the mutation and any
//! consumer/relay exchange, then releases its locks. A command may hand
//! back a completion handler; the dispatcher runs it exactly once, with no
//! lock held, before the reply goes out, and a handler failure supersedes
//! the command's own result.

pub mod channel;
pub mod output;
pub mod rotation;
pub mod session;
pub mod trigger;

use std::sync::Arc;

use crate::context::DaemonContext;
use crate::error::{CommandError, CommandResult};
use crate::notification::NotificationEvent;
use crate::protocol::{ClientReply, ClientRequest};

/// A deferred action queued by a command while it holds session state locks
/// and executed after they are released. Single-shot by construction: the
/// value is consumed by [`CompletionHandler::run`].
#[derive(Debug)]
pub struct CompletionHandler {
    event: NotificationEvent,
}

impl CompletionHandler {
    /// Queues a notification delivery.
    pub fn notify(event: NotificationEvent) -> Self {
        Self { event }
    }

    /// Runs the handler. Its error becomes the only client-visible result
    /// of the command that queued it.
    pub fn run(self, ctx: &DaemonContext) -> CommandResult<()> {
        ctx.notifications.notify(self.event).map_err(|e| match e {
            failed @ CommandError::CompletionHandlerFailed { .. } => failed,
            other => CommandError::CompletionHandlerFailed {
                message: other.to_string(),
            },
        })
    }
}

/// Runs the queued handler (if any) and settles the reply.
fn finish(
    ctx: &DaemonContext,
    reply: ClientReply,
    completion: Option<CompletionHandler>,
) -> ClientReply {
    if let Some(handler) = completion {
        if let Err(e) = handler.run(ctx) {
            return ClientReply::Error(e);
        }
    }
    reply
}

fn unit(
    ctx: &DaemonContext,
    result: CommandResult<Option<CompletionHandler>>,
) -> ClientReply {
    match result {
        Ok(completion) => finish(ctx, ClientReply::Ok, completion),
        Err(e) => ClientReply::Error(e),
    }
}

/// Entry point: one invocation per client request.
pub async fn dispatch(ctx: &Arc<DaemonContext>, request: ClientRequest) -> ClientReply {
    match request {
        ClientRequest::CreateSession { name, output_path } => {
            match session::create_session(ctx, &name, output_path).await {
                Ok((summary, completion)) => {
                    finish(ctx, ClientReply::Session(summary), completion)
                }
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::DestroySession { name } => {
            unit(ctx, session::destroy_session(ctx, &name).await)
        }
        ClientRequest::ListSessions => ClientReply::Sessions(ctx.registry.summaries().await),
        ClientRequest::EnableChannel {
            session,
            domain,
            name,
            attr,
        } => ClientReply::from_unit(
            channel::enable_channel(ctx, &session, domain, &name, attr).await,
        ),
        ClientRequest::DisableChannel {
            session,
            domain,
            name,
        } => ClientReply::from_unit(channel::disable_channel(ctx, &session, domain, &name).await),
        ClientRequest::EnableEvent {
            session,
            domain,
            channel,
            name,
        } => ClientReply::from_unit(
            channel::enable_event(ctx, &session, domain, &channel, &name).await,
        ),
        ClientRequest::DisableEvent {
            session,
            domain,
            channel,
            name,
        } => ClientReply::from_unit(
            channel::disable_event(ctx, &session, domain, &channel, &name).await,
        ),
        ClientRequest::AddContext {
            session,
            domain,
            channel,
            context,
        } => ClientReply::from_unit(
            channel::add_context(ctx, &session, domain, &channel, context).await,
        ),
        ClientRequest::SetEventFilter {
            session,
            domain,
            channel,
            event,
            expression,
        } => ClientReply::from_unit(
            channel::set_event_filter(ctx, &session, domain, &channel, &event, expression).await,
        ),
        ClientRequest::Start { session } => {
            ClientReply::from_unit(session::start_trace(ctx, &session).await)
        }
        ClientRequest::Stop { session } => {
            ClientReply::from_unit(session::stop_trace(ctx, &session).await)
        }
        ClientRequest::SetConsumerUri {
            session,
            domain,
            role,
            uri,
        } => ClientReply::from_unit(
            output::set_consumer_uri(ctx, &session, domain, role, &uri).await,
        ),
        ClientRequest::SetupRelay { session } => {
            ClientReply::from_unit(output::setup_relay(ctx, &session).await)
        }
        ClientRequest::RegisterConsumer {
            domain,
            cmd_sock_path,
        } => ClientReply::from_unit(output::register_consumer(ctx, domain, cmd_sock_path).await),
        ClientRequest::SnapshotAddOutput {
            session,
            name,
            output_path,
            control_uri,
            data_uri,
        } => {
            match output::snapshot_add_output(
                ctx,
                &session,
                &name,
                output_path,
                control_uri,
                data_uri,
            )
            .await
            {
                Ok(id) => ClientReply::SnapshotOutputAdded { id },
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::SnapshotDelOutput { session, id } => {
            ClientReply::from_unit(output::snapshot_del_output(ctx, &session, id).await)
        }
        ClientRequest::SnapshotListOutputs { session } => {
            match output::snapshot_list_outputs(ctx, &session).await {
                Ok(outputs) => ClientReply::SnapshotOutputs(outputs),
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::SnapshotRecord {
            session,
            output_path,
        } => ClientReply::from_unit(output::snapshot_record(ctx, &session, output_path).await),
        ClientRequest::Rotate { session } => {
            match rotation::rotate_session(ctx, &session).await {
                Ok(rotation_id) => ClientReply::Rotation { rotation_id },
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::RotationInfo {
            session,
            rotation_id,
        } => match rotation::get_rotation_info(ctx, &session, rotation_id).await {
            Ok(info) => ClientReply::RotationInfo(info),
            Err(e) => ClientReply::Error(e),
        },
        ClientRequest::SetRotationSchedule {
            session,
            enable,
            kind,
            value,
        } => unit(
            ctx,
            rotation::set_rotation_schedule(ctx, &session, enable, kind, value).await,
        ),
        ClientRequest::SizeThresholdReached { session } => {
            ClientReply::from_unit(rotation::size_threshold_reached(ctx, &session).await)
        }
        ClientRequest::RegisterTrigger { name } => {
            unit(ctx, trigger::register_trigger(ctx, &name).await)
        }
        ClientRequest::UnregisterTrigger { name } => {
            unit(ctx, trigger::unregister_trigger(ctx, &name).await)
        }
        ClientRequest::ListDomains { session } => {
            match session::list_domains(ctx, &session).await {
                Ok(domains) => ClientReply::Domains(domains),
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::ListChannels { session, domain } => {
            match channel::list_channels(ctx, &session, domain).await {
                Ok(channels) => ClientReply::Channels(channels),
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::ListEvents {
            session,
            domain,
            channel,
        } => match channel::list_events(ctx, &session, domain, &channel).await {
            Ok(events) => ClientReply::Events(events),
            Err(e) => ClientReply::Error(e),
        },
        ClientRequest::ListTracepoints { domain } => {
            match ctx.tracer.list_tracepoints(domain) {
                Ok(tracepoints) => ClientReply::Tracepoints(tracepoints),
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::DataPending { session } => {
            match session::data_pending(ctx, &session).await {
                Ok(pending) => ClientReply::DataPending { pending },
                Err(e) => ClientReply::Error(e),
            }
        }
        ClientRequest::Version => ClientReply::Version {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: env!("SPOOR_GIT_SHA").to_string(),
        },
    }
}
