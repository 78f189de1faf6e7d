//! Chunked XHR streaming: one POST request stays open and the server pushes
//! newline-terminated frames as chunks until the stream budget runs out.

use std::sync::Arc;

use bytes::Bytes;

use sockrs_protocol::{CloseReason, HEARTBEAT_FRAME, OPEN_FRAME, encode_data_frames};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::TransportResult;
use crate::transports::{Transport, TransportKind, account_stream_bytes, settle_close};

/// The `xhr_streaming` transport.
#[derive(Debug)]
pub struct XhrStreaming {
    config: Arc<ServerConfig>,
}

impl XhrStreaming {
    /// Create the transport for a server configuration.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    fn write_frame(&self, connection: &Connection, frame: &str) -> TransportResult<usize> {
        connection.write(Bytes::from(format!("{frame}\n")))
    }
}

impl Transport for XhrStreaming {
    fn kind(&self) -> TransportKind {
        TransportKind::XhrStreaming
    }

    fn send_open(&self, connection: &Connection) -> TransportResult<()> {
        self.write_frame(connection, OPEN_FRAME)?;
        Ok(())
    }

    fn send_heartbeat(&self, connection: &Connection) -> TransportResult<()> {
        self.write_frame(connection, HEARTBEAT_FRAME)?;
        Ok(())
    }

    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()> {
        let written = self.write_frame(connection, &encode_data_frames(messages))?;
        account_stream_bytes(connection, written, self.config.max_stream_size);
        Ok(())
    }

    fn send_close(&self, connection: &Connection, reason: CloseReason) -> TransportResult<()> {
        settle_close(connection, self.write_frame(connection, reason.frame()))
    }
}
