//! Shared test infrastructure.
//!
//! Spins up real sockets around the daemon context: scripted consumer
//! daemons on std threads answering the binary control protocol (descriptor
//! transfers included) and a scripted relay daemon for networked outputs.
//! No part of the daemon itself is mocked.

use std::collections::HashMap;
use std::io::{IoSliceMut, Read, Write};
use std::net::TcpListener;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};

use crate::config::DaemonConfig;
use crate::consumer::handle::ConsumerHandle;
use crate::consumer::protocol::{ConsumerCommand, ConsumerMessage, ConsumerStatus, MESSAGE_LEN};
use crate::context::DaemonContext;
use crate::domain::TraceDomain;
use crate::notification::{ChannelBridge, NotificationEvent};
use crate::relay::{RELAY_VERSION_MAJOR, RELAY_VERSION_MINOR};
use crate::tracer::SpoolTracer;

/// A daemon context wired to scripted consumers, plus the captured traffic.
pub(crate) struct TestHarness {
    pub ctx: Arc<DaemonContext>,
    /// Notification-bridge receiver; dropping it makes completion handlers
    /// fail, which some tests rely on.
    pub events: Option<mpsc::UnboundedReceiver<NotificationEvent>>,
    /// Every message the scripted consumers decoded, in arrival order.
    pub consumer_log: Arc<Mutex<Vec<ConsumerMessage>>>,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_reply_delay(Duration::ZERO)
    }

    /// Harness whose scripted consumers sleep before each acknowledgement,
    /// to hold exchanges in flight long enough for concurrency tests.
    pub fn with_reply_delay(reply_delay: Duration) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let consumer_log = Arc::new(Mutex::new(Vec::new()));

        let mut consumers = HashMap::new();
        for domain in TraceDomain::ALL {
            let cmd_path = tmp
                .path()
                .join(format!("consumerd-{}-cmd.sock", domain.short_name()));
            let err_path = tmp
                .path()
                .join(format!("consumerd-{}-err.sock", domain.short_name()));
            spawn_scripted_consumer(&cmd_path, consumer_log.clone(), reply_delay);
            consumers.insert(
                domain,
                Arc::new(ConsumerHandle::new(
                    domain,
                    cmd_path,
                    err_path,
                    Duration::from_secs(5),
                )),
            );
        }

        let (bridge, events) = ChannelBridge::new();
        let ctx = Arc::new(DaemonContext::new(
            DaemonConfig::default(),
            consumers,
            Arc::new(SpoolTracer::new(tmp.path().join("spool"))),
            Arc::new(bridge),
        ));

        Self {
            ctx,
            events: Some(events),
            consumer_log,
            _tmp: tmp,
        }
    }

    /// Pops the next notification event, if one arrived.
    pub fn next_event(&mut self) -> Option<NotificationEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    /// Simulates the notification subsystem going away.
    pub fn close_notifications(&mut self) {
        self.events = None;
    }

    /// Messages of one command kind seen by the scripted consumers.
    pub fn consumer_messages(&self, command: ConsumerCommand) -> Vec<ConsumerMessage> {
        self.consumer_log
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.command == command)
            .cloned()
            .collect()
    }

    pub fn consumer_message_count(&self) -> usize {
        self.consumer_log.lock().unwrap().len()
    }
}

/// Scripted consumer daemon: decodes each fixed-layout message, consumes
/// descriptor transfers where the protocol carries them, and acknowledges
/// everything.
fn spawn_scripted_consumer(
    socket_path: &Path,
    log: Arc<Mutex<Vec<ConsumerMessage>>>,
    reply_delay: Duration,
) {
    let listener = UnixListener::bind(socket_path).unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            serve_consumer_conn(&mut stream, &log, reply_delay);
        }
    });
}

fn serve_consumer_conn(
    stream: &mut UnixStream,
    log: &Mutex<Vec<ConsumerMessage>>,
    reply_delay: Duration,
) {
    loop {
        let mut buf = vec![0u8; MESSAGE_LEN];
        if stream.read_exact(&mut buf).is_err() {
            return;
        }
        let Ok(msg) = ConsumerMessage::decode(&buf) else {
            return;
        };
        let command = msg.command;
        log.lock().unwrap().push(msg);

        if matches!(
            command,
            ConsumerCommand::AddStream | ConsumerCommand::AddRelaySocket
        ) && !consume_fds(stream)
        {
            return;
        }

        if !reply_delay.is_zero() {
            std::thread::sleep(reply_delay);
        }

        let reply: i32 = match command {
            // No data left behind, ever.
            ConsumerCommand::DataPending => 0,
            _ => ConsumerStatus::Ok as i32,
        };
        if stream.write_all(&reply.to_le_bytes()).is_err() {
            return;
        }
    }
}

/// Receives one descriptor transfer and closes every received descriptor.
fn consume_fds(stream: &UnixStream) -> bool {
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; 8]);
    let mut payload = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut payload)];
    match recvmsg::<()>(
        stream.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_buffer),
        MsgFlags::empty(),
    ) {
        Ok(received) => {
            if let Ok(cmsgs) = received.cmsgs() {
                for cmsg in cmsgs {
                    if let ControlMessageOwned::ScmRights(fds) = cmsg {
                        for fd in fds {
                            drop(unsafe { OwnedFd::from_raw_fd(fd) });
                        }
                    }
                }
            }
            true
        }
        Err(_) => false,
    }
}

/// Scripted relay daemon: answers the version and create-session exchanges
/// on the control port and accepts the data connection. Returns the two
/// ports it listens on.
pub(crate) fn spawn_scripted_relay(relay_session_id: u64) -> (u16, u16) {
    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_port = control_listener.local_addr().unwrap().port();
    let data_port = data_listener.local_addr().unwrap().port();

    std::thread::spawn(move || {
        let Ok((mut control, _)) = control_listener.accept() else {
            return;
        };

        // Version: 16-byte header + 8-byte payload.
        let mut frame = [0u8; 24];
        if control.read_exact(&mut frame).is_err() {
            return;
        }
        let mut reply = Vec::new();
        reply.extend_from_slice(&RELAY_VERSION_MAJOR.to_le_bytes());
        reply.extend_from_slice(&RELAY_VERSION_MINOR.to_le_bytes());
        if control.write_all(&reply).is_err() {
            return;
        }

        // Create-session: header only.
        let mut frame = [0u8; 16];
        if control.read_exact(&mut frame).is_err() {
            return;
        }
        let mut reply = Vec::new();
        reply.extend_from_slice(&relay_session_id.to_le_bytes());
        reply.extend_from_slice(&0u32.to_le_bytes());
        let _ = control.write_all(&reply);

        // The socket ends up owned by a consumer; drain until it closes.
        let mut sink = Vec::new();
        let _ = control.read_to_end(&mut sink);
    });

    std::thread::spawn(move || {
        if let Ok((mut data, _)) = data_listener.accept() {
            let mut sink = Vec::new();
            let _ = data.read_to_end(&mut sink);
        }
    });

    (control_port, data_port)
}
