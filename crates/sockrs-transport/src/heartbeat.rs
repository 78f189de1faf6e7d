//! Per-connection heartbeat scheduling.
//!
//! One process-wide scheduler service; one lightweight self-re-arming tokio
//! task per live Connection. Each firing checks the gate and the channel:
//! if the Connection still wants heartbeats and a writable channel is
//! attached, a heartbeat frame goes out and the task re-arms; otherwise the
//! task stops by not re-arming. Heartbeats are a pure liveness signal: they
//! never consume the pending buffer and are excluded from stream-size byte
//! accounting.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, trace};

use crate::connection::Connection;

/// Process-wide heartbeat scheduler. Clone freely; all clones share nothing
/// but the tokio runtime they spawn onto.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatScheduler;

impl HeartbeatScheduler {
    /// Create a scheduler.
    pub fn new() -> Self {
        Self
    }

    /// Ensure a heartbeat task is running for this Connection. Idempotent:
    /// if a task is already alive the call is a no-op, so transports can
    /// call this on every attach (including reattaches after a stream
    /// recycle).
    pub fn start(&self, connection: Arc<Connection>) {
        connection.set_keep_heartbeat(true);
        if !connection.try_claim_heartbeat_task() {
            return;
        }
        debug!(session = %connection.session_id(), "heartbeat task started");
        tokio::spawn(async move {
            loop {
                sleep(connection.heartbeat_interval()).await;
                if !connection.keep_heartbeat() {
                    break;
                }
                let Some((_, transport)) = connection.attached() else {
                    break;
                };
                trace!(session = %connection.session_id(), "sending heartbeat");
                if transport.send_heartbeat(&connection).is_err() {
                    break;
                }
            }
            connection.release_heartbeat_task();
            debug!(session = %connection.session_id(), "heartbeat task stopped");
        });
    }
}
