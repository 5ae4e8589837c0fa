//! Consumer output description.
//!
//! Describes where trace data for one session domain goes: a local directory
//! or a pair of network endpoints. The control/data host-pairing rule is
//! enforced here, at configuration time, so a mismatched pair can never
//! reach the consumer protocol layer. Copies are deep; snapshot recording
//! relies on that to override the destination without touching the original.

use std::path::PathBuf;

use crate::error::{CommandError, CommandResult};
use crate::uri::{StreamRole, TraceUri};

/// Destination of a consumer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    /// Write chunks under a local directory.
    Local { trace_path: PathBuf },
    /// Stream to a relay daemon. Either endpoint may be unset while the
    /// output is being configured; both are required before streaming.
    Net {
        control: Option<TraceUri>,
        data: Option<TraceUri>,
    },
}

/// Where and how a session domain's trace data is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOutput {
    /// Whether a consumer should be driven for this output at all.
    pub enabled: bool,
    /// Subdirectory appended to the destination, shared by local and
    /// network outputs.
    pub subdir: String,
    /// Index of the relay socket pair on the consumer side, once assigned.
    /// Consumers use it to demultiplex streams onto relay connections.
    pub net_seq_index: Option<u64>,
    /// The destination itself.
    pub dst: OutputDestination,
}

impl ConsumerOutput {
    /// Creates a local-directory output.
    pub fn local(trace_path: PathBuf) -> Self {
        Self {
            enabled: true,
            subdir: String::new(),
            net_seq_index: None,
            dst: OutputDestination::Local { trace_path },
        }
    }

    /// Creates an empty networked output; endpoints are filled in through
    /// [`ConsumerOutput::set_network_uri`].
    pub fn net() -> Self {
        Self {
            enabled: true,
            subdir: String::new(),
            net_seq_index: None,
            dst: OutputDestination::Net {
                control: None,
                data: None,
            },
        }
    }

    /// Sets one endpoint of the network pair.
    ///
    /// A local output is converted to a networked one on the first call.
    /// Rejects an endpoint whose host differs from the already-set
    /// counterpart; both endpoints of a pair must reach the same relay.
    pub fn set_network_uri(&mut self, role: StreamRole, uri: TraceUri) -> CommandResult<()> {
        if let OutputDestination::Local { .. } = self.dst {
            self.dst = OutputDestination::Net {
                control: None,
                data: None,
            };
        }

        let OutputDestination::Net { control, data } = &mut self.dst else {
            unreachable!("output converted to Net above");
        };

        let counterpart = match role {
            StreamRole::Control => data.as_ref(),
            StreamRole::Data => control.as_ref(),
        };
        if let Some(other) = counterpart {
            if other.host != uri.host {
                return Err(CommandError::InvalidDestination {
                    message: format!(
                        "{} host '{}' does not match paired host '{}'",
                        role, uri.host, other.host
                    ),
                });
            }
        }

        match role {
            StreamRole::Control => *control = Some(uri),
            StreamRole::Data => *data = Some(uri),
        }
        Ok(())
    }

    /// True for a networked destination (even a partially-configured one).
    pub fn is_net(&self) -> bool {
        matches!(self.dst, OutputDestination::Net { .. })
    }

    /// Both network endpoints are set and streaming can be established.
    pub fn network_ready(&self) -> bool {
        matches!(
            &self.dst,
            OutputDestination::Net {
                control: Some(_),
                data: Some(_),
            }
        )
    }

    /// Control endpoint, when configured.
    pub fn control_uri(&self) -> Option<&TraceUri> {
        match &self.dst {
            OutputDestination::Net { control, .. } => control.as_ref(),
            OutputDestination::Local { .. } => None,
        }
    }

    /// Data endpoint, when configured.
    pub fn data_uri(&self) -> Option<&TraceUri> {
        match &self.dst {
            OutputDestination::Net { data, .. } => data.as_ref(),
            OutputDestination::Local { .. } => None,
        }
    }

    /// Pathname sent to consumers for this output: the trace directory for
    /// local outputs, the subdir alone for networked ones (the relay roots
    /// it under its own storage).
    pub fn consumer_pathname(&self) -> String {
        match &self.dst {
            OutputDestination::Local { trace_path } => {
                if self.subdir.is_empty() {
                    trace_path.display().to_string()
                } else {
                    trace_path.join(&self.subdir).display().to_string()
                }
            }
            OutputDestination::Net { .. } => self.subdir.clone(),
        }
    }

    /// Pathname of one domain's subtree within this output.
    pub fn domain_pathname(&self, domain: crate::domain::TraceDomain) -> String {
        let base = self.consumer_pathname();
        if base.is_empty() {
            domain.short_name().to_string()
        } else {
            format!("{}/{}", base, domain.short_name())
        }
    }

    /// Human-readable destination for listings.
    pub fn describe(&self) -> String {
        match &self.dst {
            OutputDestination::Local { trace_path } => trace_path.display().to_string(),
            OutputDestination::Net { control, data } => {
                let fmt = |uri: &Option<TraceUri>| match uri {
                    Some(u) => u.to_string(),
                    None => "<unset>".to_string(),
                };
                format!("net [control={} data={}]", fmt(control), fmt(data))
            }
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod output_tests;
