//! Standalone echo server: every message on `/echo` is sent straight back.

use std::sync::Arc;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sockrs_server::{Connection, ConnectionListener, ServerError, SockJsServer};

struct EchoListener;

impl ConnectionListener for EchoListener {
    fn on_open(&self, connection: &Connection) {
        info!(session = %connection.session_id(), "session opened");
    }

    fn on_message(&self, connection: &Connection, message: &str) {
        debug!(session = %connection.session_id(), message, "echoing");
        if let Err(err) = connection.send(message) {
            debug!(session = %connection.session_id(), %err, "echo dropped");
        }
    }

    fn on_close(&self, connection: &Connection) {
        info!(session = %connection.session_id(), "session closed");
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    SockJsServer::new()
        .endpoint("/echo", Arc::new(EchoListener))
        .serve("0.0.0.0:3002")
        .await
}
