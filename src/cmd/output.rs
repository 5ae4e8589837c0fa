//! Consumer output, relay and snapshot commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::consumer::output::ConsumerOutput;
use crate::consumer::protocol::{ConsumerMessage, RelayStreamKind};
use crate::context::DaemonContext;
use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};
use crate::protocol::SnapshotOutputInfo;
use crate::relay;
use crate::session::{Session, SessionState, SnapshotOutput};
use crate::uri::{StreamRole, TraceUri};

/// Sets one endpoint of a session's network output pair.
///
/// The URI is parsed and host-paired here, at configuration time; a
/// mismatched pair never reaches a consumer. The session template is always
/// updated so later-attached domains inherit the destination.
pub async fn set_consumer_uri(
    ctx: &Arc<DaemonContext>,
    session: &str,
    domain: TraceDomain,
    role: StreamRole,
    uri: &str,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;

    if s.state == SessionState::Active {
        return Err(CommandError::invalid_state(
            "cannot change the output of an active session",
        ));
    }
    s.output_mutable()?;

    let parsed = TraceUri::parse(uri, role)?;
    s.base_output.set_network_uri(role, parsed.clone())?;
    if let Some(domain_state) = s.domain_mut(domain) {
        domain_state.output.set_network_uri(role, parsed)?;
    }
    Ok(())
}

/// Establishes relay connections for every networked domain output that
/// does not have one yet, and hands the connected sockets to the domain
/// consumers.
pub async fn setup_relay(ctx: &Arc<DaemonContext>, session: &str) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    setup_relay_locked(ctx, &mut s).await
}

/// Relay setup with the session lock already held; shared with start.
pub(crate) async fn setup_relay_locked(
    ctx: &Arc<DaemonContext>,
    s: &mut Session,
) -> CommandResult<()> {
    let timeout = Duration::from_secs(ctx.config.relay.connect_timeout_secs);
    let unconnected: Vec<usize> = s
        .domains
        .iter()
        .enumerate()
        .filter(|(_, d)| d.output.is_net() && d.output.net_seq_index.is_none())
        .map(|(index, _)| index)
        .collect();

    for index in unconnected {
        let domain = s.domains[index].domain;
        if !s.domains[index].output.network_ready() {
            return Err(CommandError::invalid_state(format!(
                "domain '{}' output is missing a network endpoint",
                domain
            )));
        }
        let (control_uri, data_uri) = {
            let output = &s.domains[index].output;
            (
                output.control_uri().cloned().expect("network_ready checked"),
                output.data_uri().cloned().expect("network_ready checked"),
            )
        };

        let conn = relay::connect_relay(&control_uri, &data_uri, timeout)?;
        let net_index = ctx.allocate_net_seq_index();

        let consumer = ctx.consumer(domain)?;
        let relay::RelayConnection {
            control,
            data,
            session_id,
        } = conn;
        consumer
            .with_client(|c| c.send_relayd_socket(net_index, RelayStreamKind::Control, control))
            .await?;
        consumer
            .with_client(|c| c.send_relayd_socket(net_index, RelayStreamKind::Data, data))
            .await?;

        s.domains[index].output.net_seq_index = Some(net_index);
        info!(session = %s.name, domain = %domain, net_index, relay_session = session_id,
            "relay connected");
    }
    Ok(())
}

/// Re-points a domain's consumer handle at a freshly-announced command
/// socket.
pub async fn register_consumer(
    ctx: &Arc<DaemonContext>,
    domain: TraceDomain,
    cmd_sock_path: PathBuf,
) -> CommandResult<()> {
    let consumer = ctx.consumer(domain)?;
    consumer.register_socket(cmd_sock_path).await;
    Ok(())
}

/// Builds the consumer output for a snapshot destination.
fn build_snapshot_output(
    output_path: Option<PathBuf>,
    control_uri: Option<String>,
    data_uri: Option<String>,
) -> CommandResult<ConsumerOutput> {
    match (output_path, control_uri, data_uri) {
        (Some(path), None, None) => Ok(ConsumerOutput::local(path)),
        (None, Some(control), Some(data)) => {
            let mut output = ConsumerOutput::net();
            output.set_network_uri(
                StreamRole::Control,
                TraceUri::parse(&control, StreamRole::Control)?,
            )?;
            output.set_network_uri(StreamRole::Data, TraceUri::parse(&data, StreamRole::Data)?)?;
            Ok(output)
        }
        _ => Err(CommandError::InvalidDestination {
            message: "snapshot output needs either a local path or a control/data URI pair"
                .to_string(),
        }),
    }
}

/// Registers a snapshot destination on a session.
pub async fn snapshot_add_output(
    ctx: &Arc<DaemonContext>,
    session: &str,
    name: &str,
    output_path: Option<PathBuf>,
    control_uri: Option<String>,
    data_uri: Option<String>,
) -> CommandResult<u32> {
    let output = build_snapshot_output(output_path, control_uri, data_uri)?;

    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    if s.snapshot_outputs.iter().any(|o| o.name == name) {
        return Err(CommandError::AlreadyExists {
            what: format!("snapshot output '{}'", name),
        });
    }
    let id = s.allocate_snapshot_id();
    s.snapshot_outputs.push(SnapshotOutput {
        id,
        name: name.to_string(),
        output,
    });
    Ok(id)
}

/// Removes a snapshot destination by id.
pub async fn snapshot_del_output(
    ctx: &Arc<DaemonContext>,
    session: &str,
    id: u32,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;
    let mut s = handle.lock().await;
    let index = s
        .snapshot_outputs
        .iter()
        .position(|o| o.id == id)
        .ok_or_else(|| CommandError::not_found(format!("snapshot output {}", id)))?;
    s.snapshot_outputs.remove(index);
    Ok(())
}

/// Lists the snapshot destinations of a session.
pub async fn snapshot_list_outputs(
    ctx: &Arc<DaemonContext>,
    session: &str,
) -> CommandResult<Vec<SnapshotOutputInfo>> {
    let handle = ctx.registry.lookup(session).await?;
    let s = handle.lock().await;
    Ok(s.snapshot_outputs
        .iter()
        .map(|o| SnapshotOutputInfo {
            id: o.id,
            name: o.name.clone(),
            destination: o.output.describe(),
        })
        .collect())
}

/// Records a snapshot of every registered channel to the override
/// destination or to each registered snapshot output.
///
/// The in-progress flag is set under the session lock, the consumer
/// exchange runs with the lock released, and the flag is cleared under the
/// lock again; conflicting commands observe `Busy` in between.
pub async fn snapshot_record(
    ctx: &Arc<DaemonContext>,
    session: &str,
    output_path: Option<PathBuf>,
) -> CommandResult<()> {
    let handle = ctx.registry.lookup(session).await?;

    // Phase 1: validate, flag, and collect the work under the lock.
    let work = {
        let mut s = handle.lock().await;
        if s.state == SessionState::Destroying {
            return Err(CommandError::invalid_state("session is being destroyed"));
        }
        if s.rotation.is_pending() {
            return Err(CommandError::busy("rotation in progress"));
        }
        if s.snapshot_in_progress {
            return Err(CommandError::busy("snapshot in progress"));
        }

        // Deep copies: the originals stay untouched while the snapshot runs.
        let targets: Vec<ConsumerOutput> = match &output_path {
            Some(path) => vec![ConsumerOutput::local(path.clone())],
            None => s.snapshot_outputs.iter().map(|o| o.output.clone()).collect(),
        };
        if targets.is_empty() {
            return Err(CommandError::invalid_state(
                "session has no snapshot output configured",
            ));
        }

        let mut work = Vec::new();
        for target in targets {
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
                let pathname = target.domain_pathname(d.domain);
                work.push((d.domain, keys, pathname, target.net_seq_index));
            }
        }
        if work.is_empty() {
            return Err(CommandError::invalid_state(
                "session has no registered channels to snapshot",
            ));
        }

        s.snapshot_in_progress = true;
        work
    };

    // Phase 2: drive the consumers without holding the session lock.
    let mut result = Ok(());
    'outer: for (domain, keys, pathname, net_index) in work {
        let consumer = match ctx.consumer(domain) {
            Ok(c) => c,
            Err(e) => {
                result = Err(e);
                break;
            }
        };
        for key in keys {
            let msg = ConsumerMessage::snapshot_channel(key, &pathname, net_index);
            if let Err(e) = consumer.with_client(|c| c.command(&msg)).await {
                result = Err(e);
                break 'outer;
            }
        }
    }

    // Phase 3: clear the flag, then surface the first failure if any.
    let mut s = handle.lock().await;
    s.snapshot_in_progress = false;
    result
}
