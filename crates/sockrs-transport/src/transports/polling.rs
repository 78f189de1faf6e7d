//! XHR long-polling: each response carries exactly one frame and is
//! finished immediately, so every frame costs the client a fresh request.

use std::sync::Arc;

use bytes::Bytes;

use sockrs_protocol::{CloseReason, HEARTBEAT_FRAME, OPEN_FRAME, encode_data_frames};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::TransportResult;
use crate::transports::{Transport, TransportKind, settle_close};

/// The `xhr` polling transport.
#[derive(Debug)]
pub struct XhrPolling {
    #[allow(dead_code)]
    config: Arc<ServerConfig>,
}

impl XhrPolling {
    /// Create the transport for a server configuration.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Write one frame and finish the response. The Connection stays
    /// attachable for the client's next poll.
    fn write_one_shot(&self, connection: &Connection, frame: &str) -> TransportResult<usize> {
        let written = connection.write(Bytes::from(format!("{frame}\n")))?;
        connection.recycle_channel();
        Ok(written)
    }
}

impl Transport for XhrPolling {
    fn kind(&self) -> TransportKind {
        TransportKind::XhrPolling
    }

    fn send_open(&self, connection: &Connection) -> TransportResult<()> {
        self.write_one_shot(connection, OPEN_FRAME)?;
        Ok(())
    }

    fn send_heartbeat(&self, connection: &Connection) -> TransportResult<()> {
        self.write_one_shot(connection, HEARTBEAT_FRAME)?;
        Ok(())
    }

    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()> {
        self.write_one_shot(connection, &encode_data_frames(messages))?;
        Ok(())
    }

    fn send_close(&self, connection: &Connection, reason: CloseReason) -> TransportResult<()> {
        settle_close(connection, connection.write(Bytes::from(format!("{}\n", reason.frame()))))
    }
}
