//! The application-facing listener boundary.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::Connection;

/// Application callbacks for session events.
///
/// `on_open` fires exactly once per Connection, after the open frame is
/// flushed (or right after the WebSocket handshake). `on_message` fires once
/// per decoded message unit, in arrival order, never batched. `on_close`
/// fires when the Connection reaches its terminal state.
pub trait ConnectionListener: Send + Sync {
    /// A new session is open and ready for traffic.
    fn on_open(&self, connection: &Connection);

    /// One inbound application message arrived.
    fn on_message(&self, connection: &Connection, message: &str);

    /// The session reached `Closed`.
    fn on_close(&self, connection: &Connection);
}

/// Registered listeners, keyed by normalized base URL.
pub struct ListenerRegistry {
    listeners: DashMap<String, Vec<Arc<dyn ConnectionListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }

    /// Register a listener for an endpoint. Trailing slashes on the base URL
    /// are normalized away.
    pub fn add(&self, base_url: &str, listener: Arc<dyn ConnectionListener>) {
        self.listeners
            .entry(normalize_base_url(base_url))
            .or_default()
            .push(listener);
    }

    /// Drop every listener registered for an endpoint.
    pub fn remove_all(&self, base_url: &str) {
        self.listeners.remove(&normalize_base_url(base_url));
    }

    /// The normalized base URLs with at least one listener.
    pub fn base_urls(&self) -> Vec<String> {
        self.listeners.iter().map(|e| e.key().clone()).collect()
    }

    /// Whether `url` falls under a registered base URL. Matches the base
    /// itself and any path below it, but not mere string prefixes
    /// (`/echo32` is not under `/echo`).
    pub fn has_listener_for_route(&self, url: &str) -> bool {
        self.listeners.iter().any(|entry| {
            let base = entry.key();
            url.starts_with(base.as_str())
                && (url.len() == base.len() || url.as_bytes()[base.len()] == b'/')
        })
    }

    /// Whether `url` is exactly a registered base URL.
    pub fn is_base_root(&self, url: &str) -> bool {
        self.listeners.contains_key(&normalize_base_url(url))
    }

    pub(crate) fn notify_open(&self, connection: &Connection) {
        if let Some(listeners) = self.listeners.get(connection.base_url()) {
            for listener in listeners.iter() {
                listener.on_open(connection);
            }
        }
    }

    pub(crate) fn notify_message(&self, connection: &Connection, message: &str) {
        if let Some(listeners) = self.listeners.get(connection.base_url()) {
            for listener in listeners.iter() {
                listener.on_message(connection, message);
            }
        }
    }

    pub(crate) fn notify_close(&self, connection: &Connection) {
        if let Some(listeners) = self.listeners.get(connection.base_url()) {
            for listener in listeners.iter() {
                listener.on_close(connection);
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("base_urls", &self.base_urls())
            .finish()
    }
}

/// Strip a trailing slash so `/chat/` and `/chat` address the same endpoint.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.strip_suffix('/').unwrap_or(base_url).to_string()
}
