//! Full-duplex WebSocket framing: one frame per WebSocket text message,
//! no newline terminator and no stream budget.

use bytes::Bytes;

use sockrs_protocol::{
    CloseReason, HEARTBEAT_FRAME, OPEN_FRAME, decode_data_frame, encode_data_frames,
};

use crate::connection::Connection;
use crate::error::TransportResult;
use crate::transports::{Transport, TransportKind, settle_close};

/// The `websocket` transport.
#[derive(Debug, Default)]
pub struct Socket;

impl Socket {
    /// Create the transport.
    pub fn new() -> Self {
        Self
    }

    /// Decode one inbound text frame and fan it out to the listeners.
    ///
    /// An empty frame is ignored. A malformed payload is returned as an
    /// error so the caller can tear the socket down.
    pub fn handle_frame(connection: &Connection, text: &str) -> TransportResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let messages = decode_data_frame(text)?;
        for message in &messages {
            connection.notify_message(message);
        }
        Ok(())
    }
}

/// The raw WebSocket variant: application payloads pass through without
/// any SockJS framing. No open frame, no heartbeat frames, one WebSocket
/// text message per application message.
#[derive(Debug, Default)]
pub struct RawSocket;

impl RawSocket {
    /// Create the transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for RawSocket {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn send_open(&self, _connection: &Connection) -> TransportResult<()> {
        Ok(())
    }

    fn send_heartbeat(&self, _connection: &Connection) -> TransportResult<()> {
        Ok(())
    }

    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()> {
        for message in messages {
            connection.write(Bytes::from(message.clone()))?;
        }
        Ok(())
    }

    fn send_close(&self, connection: &Connection, _reason: CloseReason) -> TransportResult<()> {
        // No close frame on the wire; ending the channel makes the socket
        // task perform the WebSocket close handshake.
        connection.mark_closed();
        Ok(())
    }
}

impl Transport for Socket {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn send_open(&self, connection: &Connection) -> TransportResult<()> {
        connection.write(Bytes::from_static(OPEN_FRAME.as_bytes()))?;
        Ok(())
    }

    fn send_heartbeat(&self, connection: &Connection) -> TransportResult<()> {
        connection.write(Bytes::from_static(HEARTBEAT_FRAME.as_bytes()))?;
        Ok(())
    }

    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()> {
        connection.write(Bytes::from(encode_data_frames(messages)))?;
        Ok(())
    }

    fn send_close(&self, connection: &Connection, reason: CloseReason) -> TransportResult<()> {
        settle_close(connection, connection.write(Bytes::from_static(reason.frame().as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelHandle;
    use crate::config::ServerConfig;
    use crate::connection::SessionState;
    use crate::error::TransportError;
    use crate::listener::{ConnectionListener, ListenerRegistry};
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};

    #[derive(Debug, Default)]
    struct Recorder {
        messages: Mutex<Vec<String>>,
    }

    impl ConnectionListener for Recorder {
        fn on_open(&self, _connection: &Connection) {}
        fn on_message(&self, _connection: &Connection, message: &str) {
            self.messages.lock().push(message.to_string());
        }
        fn on_close(&self, _connection: &Connection) {}
    }

    fn setup() -> (Arc<Socket>, Connection, Arc<Recorder>) {
        let listeners = Arc::new(ListenerRegistry::new());
        let recorder = Arc::new(Recorder::default());
        listeners.add("/echo", Arc::clone(&recorder) as Arc<dyn ConnectionListener>);
        let conn = Connection::new(
            "/echo",
            "ws-test",
            Arc::new(ServerConfig::default()),
            listeners,
            Weak::new(),
        );
        (Arc::new(Socket::new()), conn, recorder)
    }

    #[tokio::test]
    async fn frames_have_no_terminator() {
        let (transport, conn, _) = setup();
        let (handle, mut rx) = ChannelHandle::pair();
        conn.attach(handle, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        transport.send_open(&conn).unwrap();
        transport.send_messages(&conn, &["hi".to_string()]).unwrap();
        transport.send_heartbeat(&conn).unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"o"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a[\"hi\"]"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"h"));
    }

    #[tokio::test]
    async fn inbound_frames_reach_listeners() {
        let (_, conn, recorder) = setup();

        Socket::handle_frame(&conn, "\"one\"").unwrap();
        Socket::handle_frame(&conn, "[\"two\",\"three\"]").unwrap();
        Socket::handle_frame(&conn, "").unwrap();

        assert_eq!(*recorder.messages.lock(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn broken_inbound_payload_is_an_error() {
        let (_, conn, recorder) = setup();

        assert!(matches!(
            Socket::handle_frame(&conn, "[\"unterminated"),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            Socket::handle_frame(&conn, "{}"),
            Err(TransportError::Decode(_))
        ));
        assert!(recorder.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn raw_socket_passes_payloads_through() {
        let (_, conn, _) = setup();
        let transport = Arc::new(RawSocket::new());
        let (handle, mut rx) = ChannelHandle::pair();
        conn.attach(handle, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        transport.send_open(&conn).unwrap();
        transport
            .send_messages(&conn, &["plain".to_string(), "text".to_string()])
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"plain"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"text"));

        transport.send_close(&conn, CloseReason::Normal).unwrap();
        assert!(rx.recv().await.is_none());
        assert_eq!(conn.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_frame_is_raw_and_terminal() {
        let (transport, conn, _) = setup();
        let (handle, mut rx) = ChannelHandle::pair();
        conn.attach(handle, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

        transport.send_close(&conn, CloseReason::AlreadyOpened).unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            Bytes::from_static(b"c[2010,\"Another connection still open\"]")
        );
        assert_eq!(conn.state(), SessionState::Closed);
    }
}
