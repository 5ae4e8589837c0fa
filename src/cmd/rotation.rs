//! Rotation commands: on-demand rotation, rotation info and the schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::consumer::protocol::ConsumerMessage;
use crate::context::DaemonContext;
use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};
use crate::notification::NotificationEvent;
use crate::protocol::ScheduleKind;
use crate::session::rotation::spawn_periodic_timer;
use crate::session::{RotationInfo, RotationRecord, RotationSchedule, Session, SessionState};

use super::CompletionHandler;

/// Consumer work of one rotation, collected under the session lock and
/// executed without it.
pub(crate) struct RotationWork {
    /// Path of the chunk being finalized, reported by rotation-info.
    pub chunk_path: PathBuf,
    /// Per-domain channel keys and the pathname of the next chunk.
    pub domains: Vec<(TraceDomain, Vec<u64>, String)>,
}

/// Gathers the channels to rotate and the chunk paths for rotation `id`.
pub(crate) fn collect_rotation_work(s: &Session, id: u64) -> RotationWork {
    let chunk_dir = RotationRecord::chunk_dir_name(id);
    let chunk_path = PathBuf::from(s.base_output.consumer_pathname()).join(&chunk_dir);

    let mut domains = Vec::new();
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
        let next_chunk = RotationRecord::chunk_dir_name(id + 1);
        let pathname = format!("{}/{}", d.output.domain_pathname(d.domain), next_chunk);
        domains.push((d.domain, keys, pathname));
    }
    RotationWork { chunk_path, domains }
}

/// Tells every affected consumer to close the current chunk and open the
/// next one. All-or-nothing from the caller's point of view: the first
/// failing exchange aborts and fails the rotation.
pub(crate) async fn do_rotate_exchange(
    ctx: &Arc<DaemonContext>,
    work: &RotationWork,
) -> CommandResult<()> {
    for (domain, keys, pathname) in &work.domains {
        let consumer = ctx.consumer(*domain)?;
        for key in keys {
            let msg = ConsumerMessage::rotate_channel(*key, pathname, false);
            consumer.with_client(|c| c.command(&msg)).await?;
        }
    }
    Ok(())
}

/// Rotates a session now.
///
/// Allocates the rotation id under the session lock, then drives the
/// consumers from a background task; the id is returned immediately and its
/// completion is observable through rotation-info. Requests racing a
/// pending rotation observe `Busy` (coalesced, never queued).
pub async fn rotate_session(ctx: &Arc<DaemonContext>, name: &str) -> CommandResult<u64> {
    let handle = ctx.registry.lookup(name).await?;

    let (id, work) = {
        let mut s = handle.lock().await;
        if s.state != SessionState::Active {
            return Err(CommandError::invalid_state(format!(
                "cannot rotate a session in state '{}'",
                s.state
            )));
        }
        if s.snapshot_in_progress {
            return Err(CommandError::busy("snapshot in progress"));
        }
        let id = s.rotation.begin()?;
        let work = collect_rotation_work(&s, id);
        (id, work)
    };

    let ctx = ctx.clone();
    let session_name = name.to_string();
    tokio::spawn(async move {
        let result = do_rotate_exchange(&ctx, &work).await;
        let mut s = handle.lock().await;
        match result {
            Ok(()) => {
                s.rotation.complete(id, work.chunk_path.clone());
                info!(session = %session_name, rotation_id = id, "rotation completed");
            }
            Err(e) => {
                s.rotation.fail(id);
                warn!(session = %session_name, rotation_id = id, error = %e, "rotation failed");
            }
        }
        // Wake a stop waiting on this rotation; the stored permit covers a
        // waiter that registers just after this point.
        s.rotation_done.notify_waiters();
        s.rotation_done.notify_one();
    });

    Ok(id)
}

/// Looks up the state of one rotation id. Only the pending and the most
/// recently settled ids are retained.
pub async fn get_rotation_info(
    ctx: &Arc<DaemonContext>,
    name: &str,
    rotation_id: u64,
) -> CommandResult<RotationInfo> {
    let handle = ctx.registry.lookup(name).await?;
    let s = handle.lock().await;
    s.rotation
        .info(rotation_id)
        .ok_or_else(|| CommandError::not_found(format!("rotation {}", rotation_id)))
}

/// Enables or disables the automatic rotation schedule of a session.
///
/// The periodic and size triggers are mutually exclusive; disabling must
/// name the currently-set kind.
pub async fn set_rotation_schedule(
    ctx: &Arc<DaemonContext>,
    name: &str,
    enable: bool,
    kind: ScheduleKind,
    value: u64,
) -> CommandResult<Option<CompletionHandler>> {
    let handle = ctx.registry.lookup(name).await?;
    let mut s = handle.lock().await;
    if s.state == SessionState::Destroying {
        return Err(CommandError::invalid_state("session is being destroyed"));
    }

    let schedule = if enable {
        if s.rotation.schedule != RotationSchedule::Disabled {
            return Err(CommandError::invalid_state(
                "a rotation schedule is already set; disable it first",
            ));
        }
        // A value of all-ones historically doubled as "disable"; disabling
        // is an explicit request here, so both extremes are rejected.
        if value == 0 || value == u64::MAX {
            return Err(CommandError::invalid_state(format!(
                "invalid schedule value {}",
                value
            )));
        }
        match kind {
            ScheduleKind::Periodic => {
                let timer = spawn_periodic_timer(
                    ctx.clone(),
                    s.name.clone(),
                    Duration::from_secs(value),
                );
                s.rotation_timer = Some(timer);
                RotationSchedule::Periodic {
                    interval_secs: value,
                }
            }
            ScheduleKind::Size => RotationSchedule::SizeThreshold { bytes: value },
        }
    } else {
        let matches_current = matches!(
            (kind, s.rotation.schedule),
            (ScheduleKind::Periodic, RotationSchedule::Periodic { .. })
                | (ScheduleKind::Size, RotationSchedule::SizeThreshold { .. })
        );
        if !matches_current {
            return Err(CommandError::invalid_state(
                "no matching rotation schedule to disable",
            ));
        }
        if let Some(timer) = s.rotation_timer.take() {
            let _ = timer.send(true);
        }
        RotationSchedule::Disabled
    };

    s.rotation.schedule = schedule;
    info!(session = %s.name, ?schedule, "rotation schedule changed");

    Ok(Some(CompletionHandler::notify(
        NotificationEvent::RotationScheduleChanged {
            session: s.name.clone(),
            schedule,
        },
    )))
}

/// Size-trigger entry point, invoked by the consumer-metrics collaborator
/// when a session's chunk crossed its configured threshold. Rotations
/// already in flight absorb the trigger.
pub async fn size_threshold_reached(ctx: &Arc<DaemonContext>, name: &str) -> CommandResult<()> {
    {
        let handle = ctx.registry.lookup(name).await?;
        let s = handle.lock().await;
        if !matches!(s.rotation.schedule, RotationSchedule::SizeThreshold { .. }) {
            return Err(CommandError::invalid_state(
                "session has no size-based rotation schedule",
            ));
        }
    }
    match rotate_session(ctx, name).await {
        Ok(_) | Err(CommandError::Busy { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
