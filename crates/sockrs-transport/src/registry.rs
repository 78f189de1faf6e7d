//! The session registry: session id → Connection.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::listener::ListenerRegistry;

/// Concurrent mapping from session id to [`Connection`], used to reattach an
/// incoming request to an existing logical session.
///
/// Inserts are atomic-if-absent, so two requests racing to create the same
/// newly-seen session id end up sharing one Connection. Connections are
/// evicted once they reach `Closed` and their close frame has been flushed.
pub struct SessionRegistry {
    connections: DashMap<String, Arc<Connection>>,
    config: Arc<ServerConfig>,
    listeners: Arc<ListenerRegistry>,
}

impl SessionRegistry {
    /// Create a registry for the given configuration and listener fan-out.
    pub fn new(config: Arc<ServerConfig>, listeners: Arc<ListenerRegistry>) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            config,
            listeners,
        })
    }

    /// Look up a session, or create and register a Connection for it.
    /// Returns the Connection and whether this call created it.
    pub fn get_or_create(
        self: &Arc<Self>,
        base_url: &str,
        session_id: &str,
    ) -> (Arc<Connection>, bool) {
        match self.connections.entry(session_id.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let connection = Arc::new(Connection::new(
                    base_url,
                    session_id,
                    Arc::clone(&self.config),
                    Arc::clone(&self.listeners),
                    Arc::downgrade(self),
                ));
                debug!(session = session_id, base_url, "session created");
                entry.insert(Arc::clone(&connection));
                (connection, true)
            }
        }
    }

    /// Create a Connection with a fresh random session id, for transports
    /// that do not carry one (raw WebSocket).
    pub fn create_anonymous(self: &Arc<Self>, base_url: &str) -> Arc<Connection> {
        let session_id = Uuid::new_v4().to_string();
        let (connection, _) = self.get_or_create(base_url, &session_id);
        connection
    }

    /// Look up an existing session.
    pub fn get(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a Closed session. Called by the Connection itself once its
    /// close frame has been flushed.
    pub fn evict(&self, session_id: &str) {
        if self.connections.remove(session_id).is_some() {
            debug!(session = session_id, "session evicted");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(
            Arc::new(ServerConfig::default()),
            Arc::new(ListenerRegistry::new()),
        )
    }

    #[test]
    fn insert_if_absent() {
        let registry = test_registry();
        let (first, created) = registry.get_or_create("/echo", "abc");
        assert!(created);
        let (second, created) = registry.get_or_create("/echo", "abc");
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn eviction_on_close() {
        let registry = test_registry();
        let (conn, _) = registry.get_or_create("/echo", "abc");
        conn.mark_closed();
        assert!(registry.get("abc").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn anonymous_ids_are_unique() {
        let registry = test_registry();
        let a = registry.create_anonymous("/echo");
        let b = registry.create_anonymous("/echo");
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(registry.len(), 2);
    }
}
