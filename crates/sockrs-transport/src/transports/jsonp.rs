//! JSONP long-polling: each response is one script-callback invocation
//! wrapping one frame, for browsers stuck without CORS.

use std::sync::Arc;

use bytes::Bytes;

use sockrs_protocol::{CloseReason, HEARTBEAT_FRAME, OPEN_FRAME, encode_data_frames, jsonp_envelope};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{TransportError, TransportResult};
use crate::transports::{Transport, TransportKind, settle_close};

/// The `jsonp` polling transport.
///
/// The callback name arrives with the first poll and is remembered on the
/// Connection; every later frame for the session is wrapped in it.
#[derive(Debug)]
pub struct JsonPolling {
    config: Arc<ServerConfig>,
}

impl JsonPolling {
    /// Create the transport for a server configuration.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    fn write_one_shot(&self, connection: &Connection, frame: &str) -> TransportResult<usize> {
        let callback = connection
            .jsonp_callback()
            .ok_or(TransportError::MissingCallback)?;
        let written = connection.write(Bytes::from(jsonp_envelope(&callback, frame)))?;
        connection.recycle_channel();
        // The envelope overhead still counts toward the stream budget,
        // accumulated across polls.
        if connection.add_sent_bytes(written) > self.config.max_stream_size {
            connection.reset_sent_bytes();
        }
        Ok(written)
    }
}

impl Transport for JsonPolling {
    fn kind(&self) -> TransportKind {
        TransportKind::JsonPolling
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
        let callback = connection
            .jsonp_callback()
            .ok_or(TransportError::MissingCallback)?;
        settle_close(
            connection,
            connection.write(Bytes::from(jsonp_envelope(&callback, reason.frame()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelHandle;
    use crate::connection::SessionState;
    use crate::listener::ListenerRegistry;
    use std::sync::Weak;

    fn setup() -> (Arc<JsonPolling>, Connection) {
        let config = Arc::new(ServerConfig::default());
        let transport = Arc::new(JsonPolling::new(Arc::clone(&config)));
        let conn = Connection::new(
            "/echo",
            "jsonp-test",
            config,
            Arc::new(ListenerRegistry::new()),
            Weak::new(),
        );
        (transport, conn)
    }

    #[tokio::test]
    async fn frames_are_wrapped_in_the_callback() {
        let (transport, conn) = setup();
        conn.set_jsonp_callback("cb123");
        let (handle, mut rx) = ChannelHandle::pair();
        conn.attach(handle, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        transport.send_open(&conn).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"cb123(\"o\");\r\n"));
        assert!(rx.recv().await.is_none());
        assert_eq!(conn.state(), SessionState::NoChannel);

        let (handle2, mut rx2) = ChannelHandle::pair();
        conn.attach(handle2, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();
        transport.send_messages(&conn, &["x".to_string()]).unwrap();
        assert_eq!(
            rx2.recv().await.unwrap(),
            Bytes::from_static(b"cb123(\"a[\\\"x\\\"]\");\r\n")
        );
    }

    #[tokio::test]
    async fn missing_callback_is_an_error() {
        let (transport, conn) = setup();
        let (handle, _rx) = ChannelHandle::pair();
        conn.attach(handle, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        assert_eq!(
            transport.send_open(&conn),
            Err(TransportError::MissingCallback)
        );
    }

    #[tokio::test]
    async fn close_is_wrapped_and_terminal() {
        let (transport, conn) = setup();
        conn.set_jsonp_callback("cb");
        let (handle, mut rx) = ChannelHandle::pair();
        conn.attach(handle, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        transport.send_close(&conn, CloseReason::Normal).unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            Bytes::from_static(b"cb(\"c[3000,\\\"Go away!\\\"]\");\r\n")
        );
        assert_eq!(conn.state(), SessionState::Closed);
    }
}
