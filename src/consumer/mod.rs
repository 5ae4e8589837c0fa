//! Consumer daemon liaison.
//!
//! One consumer daemon runs per tracing domain, out of process. This module
//! owns everything the session daemon needs to drive one:
//!
//! - **Output (`output.rs`)**: where a session's trace data goes, local
//!   directory or paired network endpoints.
//! - **Protocol (`protocol.rs`)**: the fixed-layout binary control messages.
//! - **Client (`client.rs`)**: synchronous command-socket exchanges,
//!   including descriptor hand-off.
//! - **Handle (`handle.rs`)**: the per-domain record of a live consumer
//!   process and its error-socket monitor.

pub mod client;
pub mod handle;
pub mod output;
pub mod protocol;

pub use client::ConsumerClient;
pub use handle::ConsumerHandle;
pub use output::{ConsumerOutput, OutputDestination};
pub use protocol::{ConsumerCommand, ConsumerMessage, ConsumerStatus, OutputKind};
