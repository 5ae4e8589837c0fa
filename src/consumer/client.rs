//! Consumer protocol client.
//!
//! Synchronous exchanges on a consumer daemon's command socket. A send
//! either fully succeeds or the calling command aborts with a
//! consumer-communication error; partial writes are failures, not resumed.
//! Descriptors are transferred out-of-band with `SCM_RIGHTS` ancillary data.

use std::io::{IoSlice, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};

use crate::error::{CommandError, CommandResult};

use super::protocol::{ConsumerMessage, ConsumerStatus, RelayStreamKind};

/// A connected consumer command socket.
pub struct ConsumerClient {
    stream: UnixStream,
}

impl ConsumerClient {
    /// Connects to a consumer's command socket. Both directions carry the
    /// given timeout so a wedged consumer fails the command instead of
    /// hanging the daemon.
    pub fn connect(path: &Path, timeout: Duration) -> CommandResult<Self> {
        let stream = UnixStream::connect(path)
            .map_err(|e| CommandError::consumer("connect command socket", e))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| CommandError::consumer("set socket timeout", e))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| CommandError::consumer("set socket timeout", e))?;
        Ok(Self { stream })
    }

    /// Sends one message and requires an `Ok` status back.
    pub fn command(&mut self, msg: &ConsumerMessage) -> CommandResult<()> {
        self.send_message(msg)?;
        self.expect_ok()
    }

    /// Registers a channel.
    pub fn send_channel(&mut self, msg: &ConsumerMessage) -> CommandResult<()> {
        self.command(msg)
    }

    /// Registers a stream and hands over its ring-buffer descriptor.
    pub fn send_stream(&mut self, msg: &ConsumerMessage, fd: RawFd) -> CommandResult<()> {
        self.send_message(msg)?;
        self.send_fds(&[fd])?;
        self.expect_ok()
    }

    /// Transfers ownership of a connected relay socket to the consumer.
    ///
    /// The socket is consumed: once the peer holds its own copy of the
    /// descriptor, the local one is closed by dropping `socket` here.
    pub fn send_relayd_socket(
        &mut self,
        net_index: u64,
        kind: RelayStreamKind,
        socket: TcpStream,
    ) -> CommandResult<()> {
        let msg = ConsumerMessage::relay_socket(net_index, kind);
        self.send_message(&msg)?;
        self.send_fds(&[socket.as_raw_fd()])?;
        self.expect_ok()
    }

    /// Asks whether a channel still holds unconsumed data. The reply is a
    /// raw count rather than a status code.
    pub fn data_pending(&mut self, channel_key: u64) -> CommandResult<bool> {
        let msg = ConsumerMessage::data_pending(channel_key);
        self.send_message(&msg)?;
        let mut reply = [0u8; 4];
        self.stream
            .read_exact(&mut reply)
            .map_err(|e| CommandError::consumer("receive data-pending reply", e))?;
        match i32::from_le_bytes(reply) {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CommandError::consumer(
                "receive data-pending reply",
                format!("unexpected value {}", other),
            )),
        }
    }

    fn send_message(&mut self, msg: &ConsumerMessage) -> CommandResult<()> {
        // write_all retries EINTR internally; everything else aborts.
        self.stream
            .write_all(&msg.encode())
            .map_err(|e| CommandError::consumer("send command", e))
    }

    /// Transfers descriptors with `SCM_RIGHTS` ancillary data. The one-byte
    /// payload carries the descriptor count so the receiver can sanity-check
    /// the transfer.
    fn send_fds(&mut self, fds: &[RawFd]) -> CommandResult<()> {
        let payload = [fds.len() as u8];
        let iov = [IoSlice::new(&payload)];
        let cmsgs = [ControlMessage::ScmRights(fds)];
        loop {
            match sendmsg::<()>(
                self.stream.as_raw_fd(),
                &iov,
                &cmsgs,
                MsgFlags::empty(),
                None,
            ) {
                Ok(sent) if sent == payload.len() => return Ok(()),
                Ok(sent) => {
                    return Err(CommandError::consumer(
                        "send descriptors",
                        format!("partial write of {} bytes", sent),
                    ));
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(CommandError::consumer("send descriptors", e)),
            }
        }
    }

    fn expect_ok(&mut self) -> CommandResult<()> {
        let mut reply = [0u8; 4];
        self.stream
            .read_exact(&mut reply)
            .map_err(|e| CommandError::consumer("receive status", e))?;
        let status = ConsumerStatus::from_code(i32::from_le_bytes(reply))?;
        if status == ConsumerStatus::Ok {
            Ok(())
        } else {
            Err(CommandError::consumer(
                "command refused",
                format!("{:?}", status),
            ))
        }
    }
}
