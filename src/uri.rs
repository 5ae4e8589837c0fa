//! Trace output URIs.
//!
//! A networked consumer output is described by a pair of `tcp://host:port`
//! endpoints, one for the relay control channel and one for the data channel.
//! Both endpoints of a pair must name the same destination host; that rule is
//! enforced where the pair is assembled, at configuration time.

use serde::{Deserialize, Serialize};

use crate::error::{CommandError, CommandResult};

/// Default relay control port.
pub const DEFAULT_CONTROL_PORT: u16 = 5342;

/// Default relay data port.
pub const DEFAULT_DATA_PORT: u16 = 5343;

/// Role of a network endpoint within a consumer output pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    /// Relay control channel
    Control,
    /// Relay data channel
    Data,
}

impl StreamRole {
    /// Default port for this role.
    pub fn default_port(self) -> u16 {
        match self {
            StreamRole::Control => DEFAULT_CONTROL_PORT,
            StreamRole::Data => DEFAULT_DATA_PORT,
        }
    }
}

impl std::fmt::Display for StreamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamRole::Control => f.write_str("control"),
            StreamRole::Data => f.write_str("data"),
        }
    }
}

/// A parsed network trace endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceUri {
    /// Destination host (name or address literal)
    pub host: String,
    /// Destination port
    pub port: u16,
}

impl TraceUri {
    /// Parses a `tcp://host[:port]` string. When the port is omitted the
    /// role's default is applied.
    pub fn parse(input: &str, role: StreamRole) -> CommandResult<Self> {
        let rest = input.strip_prefix("tcp://").ok_or_else(|| {
            CommandError::InvalidDestination {
                message: format!("unsupported scheme in '{}', expected tcp://", input),
            }
        })?;

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port =
                    port_str
                        .parse::<u16>()
                        .map_err(|_| CommandError::InvalidDestination {
                            message: format!("invalid port in '{}'", input),
                        })?;
                (host, port)
            }
            None => (rest, role.default_port()),
        };

        if host.is_empty() {
            return Err(CommandError::InvalidDestination {
                message: format!("missing host in '{}'", input),
            });
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for TraceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[path = "uri_tests.rs"]
mod uri_tests;
