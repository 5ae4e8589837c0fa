//! Tracer backend seam.
//!
//! The kernel and user-space tracepoint ABIs are external collaborators; the
//! orchestration core only needs ring-buffer descriptors for the streams of
//! a channel, plus the tracepoint inventory for listing. This trait is that
//! boundary. The spool backend below stands in for a real tracer by backing
//! each stream with a plain file descriptor, which keeps the descriptor
//! hand-off to consumers real.

use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::PathBuf;

use crate::domain::TraceDomain;
use crate::error::{CommandError, CommandResult};
use crate::session::ChannelAttr;

/// Ring-buffer descriptors for one channel, as handed out by a tracer.
pub struct ChannelBuffers {
    /// Length of the mapping backing each stream.
    pub mmap_len: u64,
    /// Largest sub-buffer a consumer may read in one go.
    pub max_subbuf_size: u64,
    /// One descriptor per stream, ownership passed to the caller.
    pub stream_fds: Vec<OwnedFd>,
}

/// Contract towards the tracing back-end of a domain.
pub trait TracerBackend: Send + Sync {
    /// Allocates the buffers for a channel and returns their descriptors.
    fn create_channel_buffers(
        &self,
        domain: TraceDomain,
        channel_name: &str,
        attr: &ChannelAttr,
    ) -> CommandResult<ChannelBuffers>;

    /// Lists the tracepoints the back-end currently knows for a domain.
    fn list_tracepoints(&self, domain: TraceDomain) -> CommandResult<Vec<String>>;
}

/// File-backed stand-in tracer.
///
/// Streams are backed by regular files under a spool directory. A real
/// back-end would return shared-memory ring-buffer descriptors instead; the
/// control-plane plumbing is identical either way.
pub struct SpoolTracer {
    spool_dir: PathBuf,
}

impl SpoolTracer {
    pub fn new(spool_dir: PathBuf) -> Self {
        Self { spool_dir }
    }
}

impl TracerBackend for SpoolTracer {
    fn create_channel_buffers(
        &self,
        domain: TraceDomain,
        channel_name: &str,
        attr: &ChannelAttr,
    ) -> CommandResult<ChannelBuffers> {
        let dir = self.spool_dir.join(domain.short_name());
        std::fs::create_dir_all(&dir).map_err(|e| CommandError::ResourceExhausted {
            message: format!("cannot create spool dir {}: {}", dir.display(), e),
        })?;

        let mut stream_fds = Vec::with_capacity(attr.stream_count as usize);
        for index in 0..attr.stream_count {
            let path = dir.join(format!("{}_{}", channel_name, index));
            let file = File::create(&path).map_err(|e| CommandError::ResourceExhausted {
                message: format!("cannot create stream backing {}: {}", path.display(), e),
            })?;
            stream_fds.push(OwnedFd::from(file));
        }

        Ok(ChannelBuffers {
            mmap_len: attr.subbuf_size * attr.subbuf_count,
            max_subbuf_size: attr.subbuf_size,
            stream_fds,
        })
    }

    fn list_tracepoints(&self, _domain: TraceDomain) -> CommandResult<Vec<String>> {
        // A real back-end reports its instrumented tracepoints; the spool
        // back-end has none.
        Ok(Vec::new())
    }
}
