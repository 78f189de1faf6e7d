//! Server and endpoint configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use sockrs_protocol::PRELUDE_SIZE;

/// Default heartbeat interval: 25 seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Default per-response stream size bound: 128 KiB.
pub const DEFAULT_MAX_STREAM_SIZE: usize = 128 * 1024;

/// Configuration consumed by the session/transport core and the endpoint
/// info document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interval between heartbeat frames on idle channels.
    pub heartbeat_interval: Duration,

    /// Bytes written to one long-lived response before the stream is
    /// recycled. Never below [`PRELUDE_SIZE`].
    pub max_stream_size: usize,

    /// Whether the `/info` document advertises WebSocket support and the
    /// websocket endpoints are routed.
    pub websocket_enabled: bool,

    /// Whether clients need cookie-based session affinity (`JSESSIONID`).
    pub cookies_needed: bool,

    /// URL of the SockJS client library embedded in the iframe page.
    pub client_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_stream_size: DEFAULT_MAX_STREAM_SIZE,
            websocket_enabled: true,
            cookies_needed: false,
            client_url: "https://cdn.jsdelivr.net/sockjs/1/sockjs.min.js".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a configuration with the protocol defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the stream-recycling byte threshold. Values below the streaming
    /// prelude size are clamped up to it.
    pub fn with_max_stream_size(mut self, bytes: usize) -> Self {
        self.max_stream_size = bytes.max(PRELUDE_SIZE);
        self
    }

    /// Enable or disable the WebSocket transport.
    pub fn with_websocket_enabled(mut self, enabled: bool) -> Self {
        self.websocket_enabled = enabled;
        self
    }

    /// Require cookie-based session affinity.
    pub fn with_cookies_needed(mut self, needed: bool) -> Self {
        self.cookies_needed = needed;
        self
    }

    /// Set the client library URL used by the iframe page.
    pub fn with_client_url(mut self, url: impl Into<String>) -> Self {
        self.client_url = url.into();
        self
    }
}
