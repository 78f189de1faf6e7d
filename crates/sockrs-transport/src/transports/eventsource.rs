//! Server-sent events: a long-lived `text/event-stream` response carrying
//! each frame as one `data:` event.

use std::sync::Arc;

use bytes::Bytes;

use sockrs_protocol::{CloseReason, HEARTBEAT_FRAME, OPEN_FRAME, encode_data_frames};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::TransportResult;
use crate::transports::{Transport, TransportKind, account_stream_bytes, settle_close};

/// The `eventsource` transport.
#[derive(Debug)]
pub struct EventSource {
    config: Arc<ServerConfig>,
}

impl EventSource {
    /// Create the transport for a server configuration.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// The blank-line prelude browsers expect before the first event on a
    /// `text/event-stream` response.
    pub fn prelude() -> Bytes {
        Bytes::from_static(b"\r\n")
    }

    fn write_event(&self, connection: &Connection, frame: &str) -> TransportResult<usize> {
        connection.write(Bytes::from(format!("data: {frame}\r\n\r\n")))
    }
}

impl Transport for EventSource {
    fn kind(&self) -> TransportKind {
        TransportKind::EventSource
    }

    fn send_open(&self, connection: &Connection) -> TransportResult<()> {
        self.write_event(connection, OPEN_FRAME)?;
        Ok(())
    }

    fn send_heartbeat(&self, connection: &Connection) -> TransportResult<()> {
        self.write_event(connection, HEARTBEAT_FRAME)?;
        Ok(())
    }

    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()> {
        let written = self.write_event(connection, &encode_data_frames(messages))?;
        account_stream_bytes(connection, written, self.config.max_stream_size);
        Ok(())
    }

    fn send_close(&self, connection: &Connection, reason: CloseReason) -> TransportResult<()> {
        settle_close(connection, self.write_event(connection, reason.frame()))
    }
}
