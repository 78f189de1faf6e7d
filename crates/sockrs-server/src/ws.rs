//! WebSocket endpoints: the framed SockJS transport at
//! `/{base}/{server}/{session}/websocket` and the unframed raw endpoint at
//! `/{base}/websocket`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use sockrs_protocol::CloseReason;
use sockrs_transport::transports::{RawSocket, Socket};
use sockrs_transport::{ChannelHandle, ChannelReceiver, Connection, Transport};

use crate::BaseState;
use crate::http::not_found;

/// `GET .../websocket` with an upgrade: the framed SockJS transport.
pub(crate) async fn websocket(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    request_headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.app.config.websocket_enabled {
        return not_found(&request_headers);
    }
    ws.on_upgrade(move |socket| framed_socket(state, session, socket))
}

/// `GET /{base}/websocket` with an upgrade: raw text frames, no SockJS
/// framing, an anonymous server-side session.
pub(crate) async fn raw_websocket(
    State(state): State<BaseState>,
    request_headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.app.config.websocket_enabled {
        return not_found(&request_headers);
    }
    ws.on_upgrade(move |socket| raw_socket(state, socket))
}

async fn framed_socket(state: BaseState, session: String, mut socket: WebSocket) {
    let transport: Arc<dyn Transport> = Arc::new(Socket::new());
    let (connection, _) = state.app.registry.get_or_create(&state.base_url, &session);
    let (handle, rx) = ChannelHandle::pair();
    if connection.attach(handle, Arc::clone(&transport)).is_err() {
        debug!(session = %session, "second websocket for open session");
        let _ = socket
            .send(Message::Text(CloseReason::AlreadyOpened.frame().into()))
            .await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    // Every accepted socket starts with its own open frame.
    if transport.send_open(&connection).is_err() {
        connection.mark_closed();
        return;
    }
    connection.notify_open();
    state.app.scheduler.start(Arc::clone(&connection));
    if connection.flush().is_err() {
        connection.mark_closed();
        return;
    }
    drive(connection, rx, socket, true).await;
}

async fn raw_socket(state: BaseState, socket: WebSocket) {
    let transport: Arc<dyn Transport> = Arc::new(RawSocket::new());
    let connection = state.app.registry.create_anonymous(&state.base_url);
    let (handle, rx) = ChannelHandle::pair();
    if connection.attach(handle, transport).is_err() {
        return;
    }
    connection.notify_open();
    let _ = connection.flush();
    drive(connection, rx, socket, false).await;
}

/// Pump frames both ways until either side goes away.
///
/// Outbound chunks come from the attached channel; the channel ending means
/// the session closed server-side, so the socket gets a close handshake.
/// The client vanishing (or closing) marks the session interrupted.
async fn drive(
    connection: Arc<Connection>,
    mut rx: ChannelReceiver,
    socket: WebSocket,
    framed: bool,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        interrupt(&connection);
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let handled = if framed {
                        Socket::handle_frame(&connection, text.as_str())
                    } else {
                        if !text.is_empty() {
                            connection.notify_message(text.as_str());
                        }
                        Ok(())
                    };
                    if let Err(err) = handled {
                        // A broken payload tears the socket down without a
                        // close frame.
                        debug!(session = %connection.session_id(), %err, "bad websocket payload");
                        connection.mark_closed();
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    interrupt(&connection);
                    break;
                }
                // Ping/pong and binary frames carry nothing for us; axum
                // answers pings itself.
                Some(Ok(_)) => {}
            },
        }
    }
}

fn interrupt(connection: &Connection) {
    connection.set_close_reason(CloseReason::Interrupted);
    connection.mark_closed();
}
