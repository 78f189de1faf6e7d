//! End-to-end session lifecycle across transport handoffs.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use sockrs_protocol::CloseReason;
use sockrs_transport::{
    ChannelHandle, ChannelReceiver, Connection, ConnectionListener, HeartbeatScheduler,
    ListenerRegistry, ServerConfig, SessionRegistry, SessionState, Transport, TransportError,
};
use sockrs_transport::transports::{XhrPolling, XhrStreaming};

#[derive(Debug, Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl ConnectionListener for EventLog {
    fn on_open(&self, connection: &Connection) {
        self.events.lock().push(format!("open:{}", connection.session_id()));
    }

    fn on_message(&self, _connection: &Connection, message: &str) {
        self.events.lock().push(format!("msg:{message}"));
    }

    fn on_close(&self, connection: &Connection) {
        self.events.lock().push(format!("close:{}", connection.session_id()));
    }
}

fn setup() -> (Arc<SessionRegistry>, Arc<ListenerRegistry>, Arc<EventLog>, Arc<ServerConfig>) {
    let config = Arc::new(ServerConfig::default());
    let listeners = Arc::new(ListenerRegistry::new());
    let log = Arc::new(EventLog::default());
    listeners.add("/echo", Arc::clone(&log) as Arc<dyn ConnectionListener>);
    let registry = SessionRegistry::new(Arc::clone(&config), Arc::clone(&listeners));
    (registry, listeners, log, config)
}

async fn collect(rx: &mut ChannelReceiver) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    while let Ok(Some(chunk)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        chunks.push(chunk);
    }
    chunks
}

#[tokio::test]
async fn polling_session_lifecycle() {
    let (registry, _, log, config) = setup();
    let transport: Arc<dyn Transport> = Arc::new(XhrPolling::new(config));

    // First poll creates the session and receives the open frame.
    let (conn, created) = registry.get_or_create("/echo", "s1");
    assert!(created);
    let (handle, mut rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    transport.send_open(&conn).unwrap();
    conn.notify_open();
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"o\n"));
    assert!(rx.recv().await.is_none());

    // Messages buffered between polls come out in order on the next poll.
    conn.send("m1").unwrap();
    conn.send("m2").unwrap();
    let (conn2, created) = registry.get_or_create("/echo", "s1");
    assert!(!created);
    assert!(Arc::ptr_eq(&conn, &conn2));
    let (handle, mut rx) = ChannelHandle::pair();
    conn2.attach(handle, Arc::clone(&transport)).unwrap();
    conn2.flush().unwrap();
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a[\"m1\",\"m2\"]\n"));

    // A close requested while detached is delivered on the following poll,
    // after which the session is gone from the registry.
    conn.request_close(CloseReason::Normal).unwrap();
    let (handle, mut rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    conn.flush().unwrap();
    assert_eq!(
        rx.recv().await.unwrap(),
        Bytes::from_static(b"c[3000,\"Go away!\"]\n")
    );
    assert_eq!(conn.state(), SessionState::Closed);
    assert!(registry.get("s1").is_none());
    assert_eq!(log.snapshot(), vec!["open:s1", "close:s1"]);
}

#[tokio::test]
async fn second_channel_is_rejected_while_first_is_live() {
    let (registry, _, _, config) = setup();
    let transport: Arc<dyn Transport> = Arc::new(XhrStreaming::new(config));

    let (conn, _) = registry.get_or_create("/echo", "dup");
    let (first, mut rx1) = ChannelHandle::pair();
    conn.attach(first, Arc::clone(&transport)).unwrap();
    transport.send_open(&conn).unwrap();

    let (second, _rx2) = ChannelHandle::pair();
    assert_eq!(
        conn.attach(second, Arc::clone(&transport)),
        Err(TransportError::AlreadyOpened)
    );

    // The original channel keeps working.
    conn.send("still here").unwrap();
    assert_eq!(rx1.recv().await.unwrap(), Bytes::from_static(b"o\n"));
    assert_eq!(
        rx1.recv().await.unwrap(),
        Bytes::from_static(b"a[\"still here\"]\n")
    );
}

#[tokio::test]
async fn stream_recycle_resumes_delivery_on_reattach() {
    let config = Arc::new(ServerConfig::default().with_max_stream_size(1));
    let listeners = Arc::new(ListenerRegistry::new());
    let registry = SessionRegistry::new(Arc::clone(&config), listeners);
    let transport: Arc<dyn Transport> = Arc::new(XhrStreaming::new(config));

    let (conn, _) = registry.get_or_create("/echo", "rec");
    let (handle, mut rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();

    // One frame larger than the (floor-clamped) budget forces a recycle.
    conn.send("x".repeat(4096)).unwrap();
    let chunks = collect(&mut rx).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(conn.state(), SessionState::NoChannel);

    // Messages sent while detached wait in the buffer.
    conn.send("after recycle").unwrap();
    assert_eq!(conn.state(), SessionState::NoChannel);

    // The reconnect drains them in order.
    let (handle, mut rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    conn.flush().unwrap();
    assert_eq!(
        rx.recv().await.unwrap(),
        Bytes::from_static(b"a[\"after recycle\"]\n")
    );
}

#[tokio::test]
async fn heartbeats_survive_a_recycle() {
    let config = Arc::new(
        ServerConfig::default().with_heartbeat_interval(Duration::from_millis(10)),
    );
    let listeners = Arc::new(ListenerRegistry::new());
    let registry = SessionRegistry::new(Arc::clone(&config), listeners);
    let transport: Arc<dyn Transport> = Arc::new(XhrStreaming::new(config));
    let scheduler = HeartbeatScheduler::new();

    let (conn, _) = registry.get_or_create("/echo", "hb");
    let (handle, mut rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    scheduler.start(Arc::clone(&conn));
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"h\n"));

    conn.recycle_channel();
    assert!(rx.recv().await.is_none());

    // Reattach restarts the beat; start() is idempotent whether or not the
    // previous task has wound down yet.
    let (handle, mut rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    scheduler.start(Arc::clone(&conn));
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap(),
        Bytes::from_static(b"h\n")
    );
}

#[tokio::test]
async fn dead_client_channel_allows_silent_reattach() {
    let (registry, _, _, config) = setup();
    let transport: Arc<dyn Transport> = Arc::new(XhrStreaming::new(config));

    let (conn, _) = registry.get_or_create("/echo", "gone");
    let (handle, rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    drop(rx);
    assert!(!conn.is_channel_writable());

    // Writes to the dead channel fail without poisoning the session.
    assert!(conn.flush().is_ok());
    let (handle, _rx) = ChannelHandle::pair();
    conn.attach(handle, Arc::clone(&transport)).unwrap();
    assert!(conn.is_channel_writable());
}

#[tokio::test]
async fn anonymous_sessions_register_and_evict() {
    let (registry, _, _, _config) = setup();
    let conn = registry.create_anonymous("/echo");
    assert!(registry.get(conn.session_id()).is_some());
    conn.mark_closed();
    assert!(registry.get(conn.session_id()).is_none());
}
