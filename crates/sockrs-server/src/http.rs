//! Shared HTTP plumbing: CORS and cache headers, the session-affinity
//! cookie, error bodies, and the static endpoints (greeting, info, iframe).

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    CACHE_CONTROL, CONTENT_TYPE, COOKIE, ORIGIN, SET_COOKIE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::BaseState;

pub(crate) const CONTENT_TYPE_PLAIN: &str = "text/plain; charset=utf8";
pub(crate) const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript;charset=UTF-8";
pub(crate) const CONTENT_TYPE_HTML: &str = "text/html; charset=utf8";
pub(crate) const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream;charset=UTF-8";

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";
const PREFLIGHT_MAX_AGE: u32 = 31_536_000;

/// CORS headers for transport responses: echo the request origin when one
/// is present, allow credentials, forbid caching.
pub(crate) fn transport_headers(request_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let origin = request_headers
        .get(ORIGIN)
        .cloned()
        .unwrap_or(HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers
}

/// The `JSESSIONID` affinity cookie, echoing the client's value or falling
/// back to `dummy`. Only emitted when the endpoint asks for cookies.
pub(crate) fn session_cookie(request_headers: &HeaderMap, cookies_needed: bool) -> Option<HeaderValue> {
    if !cookies_needed {
        return None;
    }
    let value = request_headers
        .get(COOKIE)
        .and_then(|cookie| cookie.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                pair.trim().strip_prefix("JSESSIONID=").map(str::to_string)
            })
        })
        .unwrap_or_else(|| "dummy".to_string());
    HeaderValue::from_str(&format!("JSESSIONID={value}; path=/")).ok()
}

/// A plain-text response with the transport CORS headers.
pub(crate) fn text_response(status: StatusCode, request_headers: &HeaderMap, body: &str) -> Response {
    let mut response = (status, transport_headers(request_headers), body.to_string()).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PLAIN));
    response
}

pub(crate) fn not_found(request_headers: &HeaderMap) -> Response {
    text_response(StatusCode::NOT_FOUND, request_headers, "")
}

pub(crate) fn internal_error(request_headers: &HeaderMap, body: &str) -> Response {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, request_headers, body)
}

/// `GET {base}` and `GET {base}/`.
pub(crate) async fn greeting() -> Response {
    (
        [(CONTENT_TYPE, CONTENT_TYPE_PLAIN)],
        "Welcome to SockJS!\n",
    )
        .into_response()
}

/// `GET {base}/info`: transport capabilities plus an entropy value the
/// client uses to seed its session id generator.
pub(crate) async fn info(State(state): State<BaseState>, request_headers: HeaderMap) -> Response {
    let config = &state.app.config;
    let document = serde_json::json!({
        "websocket": config.websocket_enabled,
        "origins": ["*:*"],
        "cookie_needed": config.cookies_needed,
        "entropy": fastrand::i32(..),
    });
    let mut headers = transport_headers(&request_headers);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf8"),
    );
    (StatusCode::OK, headers, document.to_string()).into_response()
}

/// `OPTIONS` preflight for the POST transports.
pub(crate) async fn preflight(request_headers: HeaderMap) -> Response {
    let mut headers = transport_headers(&request_headers);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("OPTIONS, POST"),
    );
    if let Some(requested) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    if let Ok(max_age) = HeaderValue::from_str(&PREFLIGHT_MAX_AGE.to_string()) {
        headers.insert(ACCESS_CONTROL_MAX_AGE, max_age);
    }
    if let Ok(cache) = HeaderValue::from_str(&format!("public, max-age={PREFLIGHT_MAX_AGE}")) {
        headers.insert(CACHE_CONTROL, cache);
    }
    (StatusCode::NO_CONTENT, headers).into_response()
}

/// `GET {base}/iframe[...].html`: the page embedding the client bootstrap
/// for cross-domain transports. Any other page name under the base is 404.
pub(crate) async fn iframe_page(
    State(state): State<BaseState>,
    Path(page): Path<String>,
    request_headers: HeaderMap,
) -> Response {
    if !(page.starts_with("iframe") && page.ends_with(".html")) {
        return not_found(&request_headers);
    }
    let client_url = &state.app.config.client_url;
    let body = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         \x20 <meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\" />\n\
         \x20 <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n\
         \x20 <script src=\"{client_url}\"></script>\n\
         \x20 <script>\n\
         \x20   document.domain = document.domain;\n\
         \x20   SockJS.bootstrap_iframe();\n\
         \x20 </script>\n\
         </head>\n\
         <body>\n\
         \x20 <h2>Don't panic!</h2>\n\
         \x20 <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>\n\
         </body>\n\
         </html>"
    );
    let mut headers = transport_headers(&request_headers);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HTML));
    (StatusCode::OK, headers, body).into_response()
}

/// Attach content-type, CORS, and the optional affinity cookie to a
/// streaming transport response.
pub(crate) fn streaming_response(
    state: &BaseState,
    request_headers: &HeaderMap,
    content_type: &'static str,
    body: Body,
) -> Response {
    let mut headers = transport_headers(request_headers);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(cookie) = session_cookie(request_headers, state.app.config.cookies_needed) {
        headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::OK, headers, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_echoes_client_value() {
        let mut request_headers = HeaderMap::new();
        request_headers.insert(
            COOKIE,
            HeaderValue::from_static("foo=bar; JSESSIONID=abc123"),
        );
        assert_eq!(
            session_cookie(&request_headers, true).unwrap(),
            HeaderValue::from_static("JSESSIONID=abc123; path=/")
        );
        assert_eq!(
            session_cookie(&HeaderMap::new(), true).unwrap(),
            HeaderValue::from_static("JSESSIONID=dummy; path=/")
        );
        assert!(session_cookie(&request_headers, false).is_none());
    }

    #[test]
    fn transport_headers_echo_origin() {
        let mut request_headers = HeaderMap::new();
        request_headers.insert(ORIGIN, HeaderValue::from_static("http://example.com"));
        let headers = transport_headers(&request_headers);
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://example.com"
        );
        let headers = transport_headers(&HeaderMap::new());
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }
}
