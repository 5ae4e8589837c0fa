//! Relay daemon handshake.
//!
//! For a networked consumer output, the session daemon connects one TCP
//! socket to the relay's control endpoint and one to its data endpoint,
//! negotiates the protocol version and creates a relay-side session on the
//! control channel, then hands both connected sockets to the domain's
//! consumer so trace data flows directly without looping back through the
//! session daemon.
//!
//! Control-channel framing: a 16-byte header `{data_size: u64, cmd: u32,
//! cmd_version: u32}` followed by `data_size` payload bytes, little endian
//! both ways.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{CommandError, CommandResult};
use crate::uri::TraceUri;

/// Protocol major version; a relay with a different major refuses us.
pub const RELAY_VERSION_MAJOR: u32 = 2;

/// Protocol minor version; the lower of ours and the relay's wins.
pub const RELAY_VERSION_MINOR: u32 = 4;

/// Control-channel commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RelayCommand {
    Version = 1,
    CreateSession = 2,
}

/// A pair of sockets connected to one relay daemon, plus the session id the
/// relay allocated for us.
#[derive(Debug)]
pub struct RelayConnection {
    pub control: TcpStream,
    pub data: TcpStream,
    pub session_id: u64,
}

/// Connects both channels to the relay named by the output's URI pair and
/// performs the version/create-session exchange.
pub fn connect_relay(
    control_uri: &TraceUri,
    data_uri: &TraceUri,
    timeout: Duration,
) -> CommandResult<RelayConnection> {
    let mut control = connect_endpoint(control_uri, timeout)?;
    exchange_version(&mut control)?;
    let session_id = create_session(&mut control)?;
    let data = connect_endpoint(data_uri, timeout)?;
    Ok(RelayConnection {
        control,
        data,
        session_id,
    })
}

fn connect_endpoint(uri: &TraceUri, timeout: Duration) -> CommandResult<TcpStream> {
    let mut addrs = (uri.host.as_str(), uri.port)
        .to_socket_addrs()
        .map_err(|e| CommandError::InvalidDestination {
            message: format!("cannot resolve {}: {}", uri, e),
        })?;
    let addr = addrs.next().ok_or_else(|| CommandError::InvalidDestination {
        message: format!("no address for {}", uri),
    })?;
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| CommandError::consumer("connect relay", e))?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|e| CommandError::consumer("set relay timeout", e))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|e| CommandError::consumer("set relay timeout", e))?;
    Ok(stream)
}

fn send_command(
    stream: &mut TcpStream,
    cmd: RelayCommand,
    payload: &[u8],
) -> CommandResult<()> {
    let mut frame = Vec::with_capacity(16 + payload.len());
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(&(cmd as u32).to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes()); // cmd_version
    frame.extend_from_slice(payload);
    stream
        .write_all(&frame)
        .map_err(|e| CommandError::consumer("send relay command", e))
}

fn recv_exact(stream: &mut TcpStream, buf: &mut [u8]) -> CommandResult<()> {
    stream
        .read_exact(buf)
        .map_err(|e| CommandError::consumer("receive relay reply", e))
}

fn exchange_version(control: &mut TcpStream) -> CommandResult<()> {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&RELAY_VERSION_MAJOR.to_le_bytes());
    payload.extend_from_slice(&RELAY_VERSION_MINOR.to_le_bytes());
    send_command(control, RelayCommand::Version, &payload)?;

    let mut reply = [0u8; 8];
    recv_exact(control, &mut reply)?;
    let mut major_bytes = [0u8; 4];
    major_bytes.copy_from_slice(&reply[..4]);
    let major = u32::from_le_bytes(major_bytes);
    let mut minor_bytes = [0u8; 4];
    minor_bytes.copy_from_slice(&reply[4..]);
    let minor = u32::from_le_bytes(minor_bytes);

    if major != RELAY_VERSION_MAJOR {
        return Err(CommandError::consumer(
            "relay version check",
            format!(
                "relay speaks {}.{}, we need major {}",
                major, minor, RELAY_VERSION_MAJOR
            ),
        ));
    }
    if minor < RELAY_VERSION_MINOR {
        tracing::warn!(major, minor, "relay is older, using its protocol minor");
    }
    Ok(())
}

fn create_session(control: &mut TcpStream) -> CommandResult<u64> {
    send_command(control, RelayCommand::CreateSession, &[])?;

    let mut reply = [0u8; 12];
    recv_exact(control, &mut reply)?;
    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&reply[..8]);
    let session_id = u64::from_le_bytes(id_bytes);
    let mut code_bytes = [0u8; 4];
    code_bytes.copy_from_slice(&reply[8..]);
    let ret_code = u32::from_le_bytes(code_bytes);

    if ret_code != 0 {
        return Err(CommandError::consumer(
            "relay create session",
            format!("relay refused with code {}", ret_code),
        ));
    }
    Ok(session_id)
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod relay_tests;
