//! Session-scoped transport handlers: one handler per wire transport URL
//! under `/{base}/{server}/{session}/`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, warn};

use sockrs_protocol::{
    CloseReason, decode_data_frame, htmlfile_chunk, jsonp_envelope, streaming_prelude,
};
use sockrs_transport::transports::{
    EventSource, HtmlFile, JsonPolling, XhrPolling, XhrStreaming,
};
use sockrs_transport::{ChannelHandle, ChannelReceiver, Transport, TransportError, TransportKind};

use crate::BaseState;
use crate::http::{
    CONTENT_TYPE_EVENT_STREAM, CONTENT_TYPE_HTML, CONTENT_TYPE_JAVASCRIPT, internal_error,
    not_found, session_cookie, streaming_response, text_response, transport_headers,
};

const CALLBACK_REQUIRED: &str = "\"callback\" parameter required";

/// `POST .../xhr`: long-poll for one frame.
pub(crate) async fn xhr_poll(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    request_headers: HeaderMap,
) -> Response {
    let transport: Arc<dyn Transport> =
        Arc::new(XhrPolling::new(Arc::clone(&state.app.config)));
    begin_session(&state, &session, transport, &request_headers, CONTENT_TYPE_JAVASCRIPT, None, None)
}

/// `POST .../xhr_streaming`: prelude plus a long-lived chunked frame stream.
pub(crate) async fn xhr_streaming(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    request_headers: HeaderMap,
) -> Response {
    let transport: Arc<dyn Transport> =
        Arc::new(XhrStreaming::new(Arc::clone(&state.app.config)));
    begin_session(
        &state,
        &session,
        transport,
        &request_headers,
        CONTENT_TYPE_JAVASCRIPT,
        Some(streaming_prelude()),
        None,
    )
}

/// `GET .../eventsource`: the frame stream as server-sent events.
pub(crate) async fn eventsource(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    request_headers: HeaderMap,
) -> Response {
    let transport: Arc<dyn Transport> =
        Arc::new(EventSource::new(Arc::clone(&state.app.config)));
    begin_session(
        &state,
        &session,
        transport,
        &request_headers,
        CONTENT_TYPE_EVENT_STREAM,
        Some(EventSource::prelude()),
        None,
    )
}

/// `GET .../htmlfile`: the frame stream as inline script chunks in a
/// padded HTML document. Requires the `c` page-callback parameter.
pub(crate) async fn htmlfile(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
) -> Response {
    let Some(callback) = params.get("c").filter(|c| !c.is_empty()) else {
        return internal_error(&request_headers, CALLBACK_REQUIRED);
    };
    let transport: Arc<dyn Transport> = Arc::new(HtmlFile::new(Arc::clone(&state.app.config)));
    begin_session(
        &state,
        &session,
        transport,
        &request_headers,
        CONTENT_TYPE_HTML,
        Some(HtmlFile::prelude(callback)),
        None,
    )
}

/// `GET .../jsonp`: long-poll for one script-callback invocation. Requires
/// the `c` callback parameter on every poll.
pub(crate) async fn jsonp_poll(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
) -> Response {
    let Some(callback) = params.get("c").filter(|c| !c.is_empty()) else {
        return internal_error(&request_headers, CALLBACK_REQUIRED);
    };
    let transport: Arc<dyn Transport> =
        Arc::new(JsonPolling::new(Arc::clone(&state.app.config)));
    begin_session(
        &state,
        &session,
        transport,
        &request_headers,
        CONTENT_TYPE_JAVASCRIPT,
        None,
        Some(callback.clone()),
    )
}

/// `POST .../xhr_send`: decode the body and fan the messages out.
pub(crate) async fn xhr_send(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    request_headers: HeaderMap,
    body: String,
) -> Response {
    let Some(connection) = state.app.registry.get(&session) else {
        return not_found(&request_headers);
    };
    match decode_data_frame(&body) {
        Ok(messages) => {
            debug!(session = %session, count = messages.len(), "inbound messages");
            for message in &messages {
                connection.notify_message(message);
            }
            let mut headers = transport_headers(&request_headers);
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(crate::http::CONTENT_TYPE_PLAIN),
            );
            if let Some(cookie) =
                session_cookie(&request_headers, state.app.config.cookies_needed)
            {
                headers.insert(axum::http::header::SET_COOKIE, cookie);
            }
            (StatusCode::NO_CONTENT, headers).into_response()
        }
        Err(err) => internal_error(&request_headers, &err.to_string()),
    }
}

/// `POST .../jsonp_send`: like xhr_send but the payload may arrive
/// form-encoded as `d=<urlencoded json>`. Responds `ok`.
pub(crate) async fn jsonp_send(
    State(state): State<BaseState>,
    Path((_server, session)): Path<(String, String)>,
    request_headers: HeaderMap,
    body: String,
) -> Response {
    let Some(connection) = state.app.registry.get(&session) else {
        return not_found(&request_headers);
    };
    let payload = if let Some(encoded) = body.strip_prefix("d=") {
        match urlencoding::decode(encoded) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return internal_error(&request_headers, "Payload expected."),
        }
    } else if body.starts_with('[') || body.starts_with('"') {
        body
    } else {
        String::new()
    };
    if payload.trim().is_empty() {
        return internal_error(&request_headers, "Payload expected.");
    }
    match decode_data_frame(&payload) {
        Ok(messages) => {
            for message in &messages {
                connection.notify_message(message);
            }
            text_response(StatusCode::OK, &request_headers, "ok")
        }
        Err(err) => internal_error(&request_headers, &err.to_string()),
    }
}

/// Resolve the session, attach a fresh channel, and stream frames back.
///
/// A second concurrent channel is answered with a one-shot `c[2010,...]`
/// body on its own response; the established channel is untouched.
#[allow(clippy::too_many_arguments)]
fn begin_session(
    state: &BaseState,
    session_id: &str,
    transport: Arc<dyn Transport>,
    request_headers: &HeaderMap,
    content_type: &'static str,
    prelude: Option<Bytes>,
    jsonp_callback: Option<String>,
) -> Response {
    let (connection, created) = state.app.registry.get_or_create(&state.base_url, session_id);
    if let Some(callback) = &jsonp_callback {
        connection.set_jsonp_callback(callback.clone());
    }
    let (handle, rx) = ChannelHandle::pair();
    if let Err(err) = connection.attach(handle, Arc::clone(&transport)) {
        let reason = match err {
            TransportError::AlreadyOpened => CloseReason::AlreadyOpened,
            _ => connection.close_reason().unwrap_or(CloseReason::Normal),
        };
        debug!(
            session = session_id,
            transport = %transport.kind(),
            %reason,
            "channel rejected"
        );
        let mut body = prelude.map(|p| p.to_vec()).unwrap_or_default();
        body.extend_from_slice(
            rejection_frame(transport.kind(), reason, jsonp_callback.as_deref()).as_bytes(),
        );
        return streaming_response(state, request_headers, content_type, Body::from(body));
    }

    if created {
        if let Err(err) = transport.send_open(&connection) {
            warn!(session = session_id, %err, "open frame failed");
        }
        connection.notify_open();
    }
    state.app.scheduler.start(Arc::clone(&connection));
    if let Err(err) = connection.flush() {
        debug!(session = session_id, %err, "flush on attach failed");
    }

    streaming_response(state, request_headers, content_type, channel_body(prelude, rx))
}

/// The close frame a rejected or dead-session response carries, framed the
/// way the requested transport frames everything else.
fn rejection_frame(kind: TransportKind, reason: CloseReason, callback: Option<&str>) -> String {
    match kind {
        TransportKind::XhrPolling | TransportKind::XhrStreaming => {
            format!("{}\n", reason.frame())
        }
        TransportKind::EventSource => format!("data: {}\r\n\r\n", reason.frame()),
        TransportKind::JsonPolling => jsonp_envelope(callback.unwrap_or("callback"), reason.frame()),
        TransportKind::HtmlFile => htmlfile_chunk(reason.frame()),
        TransportKind::WebSocket => reason.frame().to_string(),
    }
}

/// Turn a channel receiver into a streaming response body, optionally
/// preceded by a transport prelude. The body ends when the channel is
/// finished or recycled.
fn channel_body(prelude: Option<Bytes>, mut rx: ChannelReceiver) -> Body {
    Body::from_stream(async_stream::stream! {
        if let Some(prelude) = prelude {
            yield Ok::<Bytes, Infallible>(prelude);
        }
        while let Some(chunk) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    })
}
