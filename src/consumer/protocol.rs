//! Binary control protocol spoken to consumer daemons.
//!
//! Messages are a single fixed-layout little-endian record; replies are one
//! little-endian i32 status code. Descriptors travel out-of-band as
//! `SCM_RIGHTS` ancillary data when a command needs them (see `client.rs`).
//! The layout is shared with the consumer daemons and must stay stable.

use crate::error::{CommandError, CommandResult};

/// Fixed size of the channel/stream name field.
pub const NAME_LEN: usize = 64;

/// Fixed size of the pathname field.
pub const PATH_LEN: usize = 256;

/// Wire value of an unassigned relay socket index.
pub const NET_INDEX_UNSET: u64 = u64::MAX;

/// Total encoded message size.
pub const MESSAGE_LEN: usize = 68 + NAME_LEN + PATH_LEN;

/// Commands understood by a consumer daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ConsumerCommand {
    /// Register a channel and its buffer sizing
    AddChannel = 0,
    /// Register a stream of a channel; carries the stream descriptor
    AddStream = 1,
    /// Take ownership of a connected relay socket
    AddRelaySocket = 2,
    /// Drop a channel and every stream it owns
    DestroyChannel = 3,
    /// Close the current trace chunk of a channel and open the next one
    RotateChannel = 4,
    /// Record a snapshot of a channel to the given destination
    SnapshotChannel = 5,
    /// Ask whether a channel still holds unconsumed data
    DataPending = 6,
}

impl ConsumerCommand {
    fn from_wire(value: u32) -> CommandResult<Self> {
        match value {
            0 => Ok(ConsumerCommand::AddChannel),
            1 => Ok(ConsumerCommand::AddStream),
            2 => Ok(ConsumerCommand::AddRelaySocket),
            3 => Ok(ConsumerCommand::DestroyChannel),
            4 => Ok(ConsumerCommand::RotateChannel),
            5 => Ok(ConsumerCommand::SnapshotChannel),
            6 => Ok(ConsumerCommand::DataPending),
            other => Err(CommandError::consumer(
                "decode message",
                format!("unknown command id {}", other),
            )),
        }
    }
}

/// How a consumer extracts events from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Read through a shared mapping
    #[default]
    Mmap = 0,
    /// Kernel-assisted copy
    Splice = 1,
}

impl OutputKind {
    fn from_wire(value: u32) -> CommandResult<Self> {
        match value {
            0 => Ok(OutputKind::Mmap),
            1 => Ok(OutputKind::Splice),
            other => Err(CommandError::consumer(
                "decode message",
                format!("unknown output kind {}", other),
            )),
        }
    }
}

/// Which relay channel a transferred socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RelayStreamKind {
    Control = 0,
    Data = 1,
    Metadata = 2,
}

/// Status code replied by a consumer after each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ConsumerStatus {
    Ok = 0,
    Error = 1,
    InvalidArgument = 2,
    OutOfMemory = 3,
    Fatal = 4,
}

impl ConsumerStatus {
    /// Decodes a status code from the wire.
    pub fn from_code(code: i32) -> CommandResult<Self> {
        match code {
            0 => Ok(ConsumerStatus::Ok),
            1 => Ok(ConsumerStatus::Error),
            2 => Ok(ConsumerStatus::InvalidArgument),
            3 => Ok(ConsumerStatus::OutOfMemory),
            4 => Ok(ConsumerStatus::Fatal),
            other => Err(CommandError::consumer(
                "decode status",
                format!("unknown status code {}", other),
            )),
        }
    }
}

/// One fixed-layout control message.
///
/// Every command uses the same record; fields irrelevant to a command are
/// zero. `name` and `pathname` are truncated to their field sizes on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    pub command: ConsumerCommand,
    pub channel_key: u64,
    pub stream_key: u64,
    /// Nonzero when the channel/stream belongs to an actively-tracing session.
    pub state: u32,
    pub output: OutputKind,
    pub max_subbuf_size: u64,
    pub mmap_len: u64,
    pub uid: u32,
    pub gid: u32,
    /// Relay socket index, [`NET_INDEX_UNSET`] for local outputs.
    pub net_index: u64,
    /// Nonzero for the metadata channel/stream of a domain.
    pub metadata_flag: u32,
    /// Relay stream kind for [`ConsumerCommand::AddRelaySocket`].
    pub relay_stream_kind: u32,
    pub name: String,
    pub pathname: String,
}

impl ConsumerMessage {
    fn zeroed(command: ConsumerCommand) -> Self {
        Self {
            command,
            channel_key: 0,
            stream_key: 0,
            state: 0,
            output: OutputKind::Mmap,
            max_subbuf_size: 0,
            mmap_len: 0,
            uid: 0,
            gid: 0,
            net_index: NET_INDEX_UNSET,
            metadata_flag: 0,
            relay_stream_kind: 0,
            name: String::new(),
            pathname: String::new(),
        }
    }

    /// Builds a channel registration message.
    #[allow(clippy::too_many_arguments)]
    pub fn channel(
        channel_key: u64,
        name: &str,
        pathname: &str,
        output: OutputKind,
        max_subbuf_size: u64,
        mmap_len: u64,
        uid: u32,
        gid: u32,
    ) -> Self {
        Self {
            channel_key,
            output,
            max_subbuf_size,
            mmap_len,
            uid,
            gid,
            name: name.to_string(),
            pathname: pathname.to_string(),
            ..Self::zeroed(ConsumerCommand::AddChannel)
        }
    }

    /// Builds a stream registration message.
    #[allow(clippy::too_many_arguments)]
    pub fn stream(
        channel_key: u64,
        stream_key: u64,
        active: bool,
        output: OutputKind,
        mmap_len: u64,
        uid: u32,
        gid: u32,
        net_index: Option<u64>,
        metadata: bool,
        name: &str,
        pathname: &str,
    ) -> Self {
        Self {
            channel_key,
            stream_key,
            state: u32::from(active),
            output,
            mmap_len,
            uid,
            gid,
            net_index: net_index.unwrap_or(NET_INDEX_UNSET),
            metadata_flag: u32::from(metadata),
            name: name.to_string(),
            pathname: pathname.to_string(),
            ..Self::zeroed(ConsumerCommand::AddStream)
        }
    }

    /// Builds the message preceding a relay socket hand-off.
    pub fn relay_socket(net_index: u64, kind: RelayStreamKind) -> Self {
        Self {
            net_index,
            relay_stream_kind: kind as u32,
            ..Self::zeroed(ConsumerCommand::AddRelaySocket)
        }
    }

    /// Builds a channel teardown message.
    pub fn destroy_channel(channel_key: u64) -> Self {
        Self {
            channel_key,
            ..Self::zeroed(ConsumerCommand::DestroyChannel)
        }
    }

    /// Builds a chunk rotation message; `pathname` names the chunk directory
    /// the consumer opens next.
    pub fn rotate_channel(channel_key: u64, pathname: &str, metadata: bool) -> Self {
        Self {
            channel_key,
            metadata_flag: u32::from(metadata),
            pathname: pathname.to_string(),
            ..Self::zeroed(ConsumerCommand::RotateChannel)
        }
    }

    /// Builds a snapshot message; `pathname` names the snapshot destination.
    pub fn snapshot_channel(channel_key: u64, pathname: &str, net_index: Option<u64>) -> Self {
        Self {
            channel_key,
            net_index: net_index.unwrap_or(NET_INDEX_UNSET),
            pathname: pathname.to_string(),
            ..Self::zeroed(ConsumerCommand::SnapshotChannel)
        }
    }

    /// Builds a data-pending query for one channel.
    pub fn data_pending(channel_key: u64) -> Self {
        Self {
            channel_key,
            ..Self::zeroed(ConsumerCommand::DataPending)
        }
    }

    /// Encodes the message into its fixed wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MESSAGE_LEN);
        buf.extend_from_slice(&(self.command as u32).to_le_bytes());
        buf.extend_from_slice(&self.channel_key.to_le_bytes());
        buf.extend_from_slice(&self.stream_key.to_le_bytes());
        buf.extend_from_slice(&self.state.to_le_bytes());
        buf.extend_from_slice(&(self.output as u32).to_le_bytes());
        buf.extend_from_slice(&self.max_subbuf_size.to_le_bytes());
        buf.extend_from_slice(&self.mmap_len.to_le_bytes());
        buf.extend_from_slice(&self.uid.to_le_bytes());
        buf.extend_from_slice(&self.gid.to_le_bytes());
        buf.extend_from_slice(&self.net_index.to_le_bytes());
        buf.extend_from_slice(&self.metadata_flag.to_le_bytes());
        buf.extend_from_slice(&self.relay_stream_kind.to_le_bytes());
        push_fixed_str(&mut buf, &self.name, NAME_LEN);
        push_fixed_str(&mut buf, &self.pathname, PATH_LEN);
        debug_assert_eq!(buf.len(), MESSAGE_LEN);
        buf
    }

    /// Decodes a message from its fixed wire layout. Used by consumer-side
    /// endpoints (and by tests standing in for one).
    pub fn decode(buf: &[u8]) -> CommandResult<Self> {
        if buf.len() != MESSAGE_LEN {
            return Err(CommandError::consumer(
                "decode message",
                format!("expected {} bytes, got {}", MESSAGE_LEN, buf.len()),
            ));
        }
        let mut cursor = Cursor { buf, offset: 0 };
        let command = ConsumerCommand::from_wire(cursor.u32())?;
        let channel_key = cursor.u64();
        let stream_key = cursor.u64();
        let state = cursor.u32();
        let output = OutputKind::from_wire(cursor.u32())?;
        let max_subbuf_size = cursor.u64();
        let mmap_len = cursor.u64();
        let uid = cursor.u32();
        let gid = cursor.u32();
        let net_index = cursor.u64();
        let metadata_flag = cursor.u32();
        let relay_stream_kind = cursor.u32();
        let name = cursor.fixed_str(NAME_LEN);
        let pathname = cursor.fixed_str(PATH_LEN);
        Ok(Self {
            command,
            channel_key,
            stream_key,
            state,
            output,
            max_subbuf_size,
            mmap_len,
            uid,
            gid,
            net_index,
            metadata_flag,
            relay_stream_kind,
            name,
            pathname,
        })
    }
}

/// Appends `value` zero-padded/truncated to exactly `len` bytes, always
/// leaving a terminating NUL.
fn push_fixed_str(buf: &mut Vec<u8>, value: &str, len: usize) {
    let bytes = value.as_bytes();
    let copied = bytes.len().min(len - 1);
    buf.extend_from_slice(&bytes[..copied]);
    buf.resize(buf.len() + (len - copied), 0);
}

struct Cursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    fn u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.offset..self.offset + 4]);
        self.offset += 4;
        u32::from_le_bytes(bytes)
    }

    fn u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[self.offset..self.offset + 8]);
        self.offset += 8;
        u64::from_le_bytes(bytes)
    }

    fn fixed_str(&mut self, len: usize) -> String {
        let field = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        let end = field.iter().position(|&b| b == 0).unwrap_or(len);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod protocol_tests;
