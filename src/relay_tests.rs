//! Tests for the relay control-channel handshake.

use super::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::Duration;

use crate::uri::StreamRole;

fn local_uri(port: u16) -> TraceUri {
    TraceUri::parse(&format!("tcp://127.0.0.1:{}", port), StreamRole::Control).unwrap()
}

/// Minimal scripted relay: answers the version exchange and one
/// create-session on the control channel, accepts the data connection.
fn spawn_scripted_relay(refuse_session: bool) -> (u16, std::thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (mut control, _) = listener.accept().unwrap();

        // Version command: 16-byte header + 8-byte payload.
        let mut frame = [0u8; 24];
        control.read_exact(&mut frame).unwrap();
        let mut reply = Vec::new();
        reply.extend_from_slice(&RELAY_VERSION_MAJOR.to_le_bytes());
        reply.extend_from_slice(&RELAY_VERSION_MINOR.to_le_bytes());
        control.write_all(&reply).unwrap();

        // Create-session command: header only.
        let mut frame = [0u8; 16];
        control.read_exact(&mut frame).unwrap();
        let mut reply = Vec::new();
        reply.extend_from_slice(&77u64.to_le_bytes());
        reply.extend_from_slice(&u32::from(refuse_session).to_le_bytes());
        control.write_all(&reply).unwrap();

        if !refuse_session {
            // Data channel connects after the control handshake.
            let _ = listener.accept();
        }
    });
    (port, handle)
}

#[test]
fn test_handshake_yields_relay_session_id() {
    let (port, relay) = spawn_scripted_relay(false);
    let uri = local_uri(port);
    let conn = connect_relay(&uri, &uri, Duration::from_secs(5)).unwrap();
    assert_eq!(conn.session_id, 77);
    drop(conn);
    relay.join().unwrap();
}

#[test]
fn test_refused_session_is_a_communication_error() {
    let (port, relay) = spawn_scripted_relay(true);
    let uri = local_uri(port);
    let err = connect_relay(&uri, &uri, Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, CommandError::ConsumerCommunication { .. }));
    relay.join().unwrap();
}

#[test]
fn test_unresolvable_host_is_invalid_destination() {
    let uri = TraceUri::parse(
        "tcp://no-such-host.invalid:5342",
        StreamRole::Control,
    )
    .unwrap();
    let err = connect_relay(&uri, &uri, Duration::from_millis(100)).unwrap_err();
    assert!(matches!(err, CommandError::InvalidDestination { .. }));
}
