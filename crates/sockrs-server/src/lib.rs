//! # sockrs-server
//!
//! The HTTP/WebSocket surface of sockrs: URL routing from
//! `/{base}/{server}/{session}/{transport}` paths into the session core,
//! the static endpoints (greeting, `/info`, `/iframe*.html`), CORS and
//! preflight handling, and server bootstrap.
//!
//! ## Architecture
//!
//! ```text
//! sockrs-server/
//! ├── http.rs    # headers, cookies, greeting/info/iframe, preflight
//! ├── routes.rs  # per-transport session handlers (xhr, streaming, jsonp, ...)
//! └── ws.rs      # framed and raw WebSocket endpoints
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use sockrs_server::{ConnectionListener, SockJsServer};
//! use sockrs_transport::Connection;
//!
//! struct Echo;
//!
//! impl ConnectionListener for Echo {
//!     fn on_open(&self, _connection: &Connection) {}
//!     fn on_message(&self, connection: &Connection, message: &str) {
//!         let _ = connection.send(message);
//!     }
//!     fn on_close(&self, _connection: &Connection) {}
//! }
//!
//! # async fn run() -> Result<(), sockrs_server::ServerError> {
//! SockJsServer::new()
//!     .endpoint("/echo", Arc::new(Echo))
//!     .serve("0.0.0.0:3002")
//!     .await
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::ToSocketAddrs;
use tower_http::trace::TraceLayer;
use tracing::info;

use sockrs_transport::{HeartbeatScheduler, ListenerRegistry, SessionRegistry};

mod http;
mod routes;
mod ws;

pub use sockrs_transport::{Connection, ConnectionListener, ServerConfig};

/// Errors from server bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving the TCP listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared per-server state handed to every handler.
#[derive(Debug, Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) scheduler: HeartbeatScheduler,
}

/// [`AppState`] plus the endpoint base URL the matched route belongs to.
#[derive(Debug, Clone)]
pub(crate) struct BaseState {
    pub(crate) base_url: String,
    pub(crate) app: AppState,
}

/// Builder for a SockJS endpoint server.
///
/// Register one or more endpoints, each a base URL plus a
/// [`ConnectionListener`], then either [`serve`](Self::serve) directly or
/// take the [`router`](Self::router) and mount it yourself.
#[derive(Debug)]
pub struct SockJsServer {
    config: ServerConfig,
    listeners: Arc<ListenerRegistry>,
}

impl SockJsServer {
    /// Create a server with the protocol-default configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a server with an explicit configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Register a listener for an endpoint base URL such as `/echo`.
    pub fn endpoint(
        self,
        base_url: &str,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        self.listeners.add(base_url, listener);
        self
    }

    /// Build the axum router for every registered endpoint.
    pub fn router(&self) -> Router {
        self.router_with_registry().0
    }

    /// Build the router and also return the session registry behind it,
    /// for callers that push messages into sessions from outside the
    /// listener callbacks.
    pub fn router_with_registry(&self) -> (Router, Arc<SessionRegistry>) {
        let config = Arc::new(self.config.clone());
        let registry = SessionRegistry::new(Arc::clone(&config), Arc::clone(&self.listeners));
        let app = AppState {
            config,
            registry: Arc::clone(&registry),
            scheduler: HeartbeatScheduler::new(),
        };
        let mut router = Router::new();
        for base_url in self.listeners.base_urls() {
            router = router.merge(endpoint_router(&base_url, app.clone()));
        }
        (router.layer(TraceLayer::new_for_http()), registry)
    }

    /// Bind and serve until the task is cancelled.
    pub async fn serve(self, addr: impl ToSocketAddrs) -> Result<(), ServerError> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "sockjs server listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}

impl Default for SockJsServer {
    fn default() -> Self {
        Self::new()
    }
}

/// All routes for one endpoint base URL, registered as literal paths so
/// endpoints never shadow each other.
fn endpoint_router(base_url: &str, app: AppState) -> Router {
    let state = BaseState {
        base_url: base_url.to_string(),
        app,
    };
    let session = |transport: &str| format!("{base_url}/{{server}}/{{session}}/{transport}");
    Router::new()
        .route(base_url, get(http::greeting))
        .route(&format!("{base_url}/"), get(http::greeting))
        .route(&format!("{base_url}/info"), get(http::info).options(http::preflight))
        .route(&format!("{base_url}/{{page}}"), get(http::iframe_page))
        .route(&format!("{base_url}/websocket"), get(ws::raw_websocket))
        .route(&session("xhr"), post(routes::xhr_poll).options(http::preflight))
        .route(&session("xhr_send"), post(routes::xhr_send).options(http::preflight))
        .route(
            &session("xhr_streaming"),
            post(routes::xhr_streaming).options(http::preflight),
        )
        .route(&session("eventsource"), get(routes::eventsource))
        .route(&session("jsonp"), get(routes::jsonp_poll))
        .route(&session("jsonp_send"), post(routes::jsonp_send).options(http::preflight))
        .route(&session("htmlfile"), get(routes::htmlfile))
        .route(&session("websocket"), get(ws::websocket))
        .with_state(state)
}
