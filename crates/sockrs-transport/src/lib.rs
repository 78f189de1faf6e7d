//! # sockrs-transport
//!
//! The session/connection core of sockrs: everything between the wire
//! framing codec ([`sockrs_protocol`]) and the HTTP surface.
//!
//! ## Architecture
//!
//! ```text
//! sockrs-transport/
//! ├── channel.rs     # chunk pipe + liveness flag, the Connection's weak channel handle
//! ├── config.rs      # ServerConfig: heartbeat interval, max stream size, endpoint flags
//! ├── connection.rs  # Connection: session state machine, pending buffer, byte counter
//! ├── error.rs       # TransportError / TransportResult
//! ├── heartbeat.rs   # per-connection self-re-arming heartbeat task
//! ├── listener.rs    # ConnectionListener fan-out, per-base-url registry
//! ├── registry.rs    # session id -> Connection, atomic insert-if-absent
//! └── transports/    # one module per wire transport variant
//! ```
//!
//! A [`Connection`] is the transport-independent logical client connection.
//! It outlives individual HTTP requests: polling and streaming transports
//! detach and reattach channels as the client reconnects, and buffered
//! messages survive the handoffs in enqueue order.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod listener;
pub mod registry;
pub mod transports;

pub use channel::{ChannelHandle, ChannelReceiver};
pub use config::ServerConfig;
pub use connection::{Connection, SessionState};
pub use error::{TransportError, TransportResult};
pub use heartbeat::HeartbeatScheduler;
pub use listener::{ConnectionListener, ListenerRegistry};
pub use registry::SessionRegistry;
pub use transports::{Transport, TransportKind};
