//! spoor — a tracing session control plane.
//!
//! The daemon (`spoord`) creates and manages tracing sessions spanning
//! kernel and user-space domains, drives one out-of-process consumer daemon
//! per domain over a binary control protocol (descriptors included), and
//! optionally streams trace data to a remote relay daemon.
//!
//! ## Architecture
//!
//! - **Registry (`session`)**: the lock-protected session index and the
//!   per-session state machine, rotation bookkeeping included.
//! - **Dispatcher (`cmd`)**: one function per exported command, serialized
//!   per session, with deferred completion handlers.
//! - **Consumer liaison (`consumer`)**: output destinations, the fixed-layout
//!   control protocol and the per-domain process handles.
//! - **Relay (`relay`)**: version/create-session handshake towards a relay
//!   daemon; connected sockets are handed to consumers.
//! - **Health (`health`)**: per-subsystem liveness flags and the check
//!   responder socket.
//! - **Ingress (`server`, `protocol`)**: the newline-JSON client control
//!   socket.

pub mod cmd;
pub mod config;
pub mod consumer;
pub mod context;
pub mod domain;
pub mod error;
pub mod health;
pub mod notification;
pub mod paths;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod tracer;
pub mod uri;

#[cfg(test)]
pub(crate) mod testutil;
