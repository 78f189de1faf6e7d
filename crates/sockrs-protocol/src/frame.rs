//! Frame encoding and decoding.

use bytes::Bytes;
use std::fmt;
use std::sync::OnceLock;

use crate::error::DecodeError;

/// The open frame, sent once when a session comes up.
pub const OPEN_FRAME: &str = "o";

/// The heartbeat frame, a bare liveness signal.
pub const HEARTBEAT_FRAME: &str = "h";

/// Leading character of a message frame.
pub const DATA_FRAME: &str = "a";

/// Size in bytes of the filler prelude streaming transports emit before the
/// first real frame, to defeat client-side content sniffing and proxy
/// buffering. 2 KiB.
pub const PRELUDE_SIZE: usize = 2048;

/// The fixed close reasons a server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Server-initiated orderly shutdown of the session.
    Normal,
    /// A second channel tried to bind to a session that already has a live one.
    AlreadyOpened,
    /// The underlying channel died without a close handshake.
    Interrupted,
}

impl CloseReason {
    /// Numeric status code carried in the close frame.
    pub const fn code(self) -> u16 {
        match self {
            Self::Normal => 3000,
            Self::AlreadyOpened => 2010,
            Self::Interrupted => 1002,
        }
    }

    /// Human-readable close text carried in the close frame.
    pub const fn text(self) -> &'static str {
        match self {
            Self::Normal => "Go away!",
            Self::AlreadyOpened => "Another connection still open",
            Self::Interrupted => "Connection interrupted",
        }
    }

    /// The full `c[code,"text"]` frame for this reason.
    pub const fn frame(self) -> &'static str {
        match self {
            Self::Normal => "c[3000,\"Go away!\"]",
            Self::AlreadyOpened => "c[2010,\"Another connection still open\"]",
            Self::Interrupted => "c[1002,\"Connection interrupted\"]",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.text())
    }
}

/// JSON string-escape a payload, quotes included.
pub fn json_quote(payload: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(payload).unwrap_or_default()
}

/// Encode a single message payload as an `a["..."]` frame.
pub fn encode_data_frame(payload: &str) -> String {
    format!("a[{}]", json_quote(payload))
}

/// Encode a batch of message payloads as one `a[...]` frame, preserving order.
pub fn encode_data_frames(payloads: &[String]) -> String {
    // Serializing a slice of strings cannot fail.
    let encoded = serde_json::to_string(payloads).unwrap_or_else(|_| "[]".into());
    format!("a{encoded}")
}

/// Encode a `c[code,"text"]` close frame.
pub fn encode_close(code: u16, text: &str) -> String {
    format!("c[{code},{}]", json_quote(text))
}

/// Decode an inbound data payload.
///
/// Accepts either a bare JSON string literal (one message) or a JSON array
/// of strings (a batch). Any other shape is [`DecodeError::PayloadExpected`];
/// malformed JSON is [`DecodeError::BrokenJson`].
pub fn decode_data_frame(raw: &str) -> Result<Vec<String>, DecodeError> {
    if raw.starts_with('[') {
        Ok(serde_json::from_str::<Vec<String>>(raw)?)
    } else if raw.starts_with('"') {
        Ok(vec![serde_json::from_str::<String>(raw)?])
    } else {
        Err(DecodeError::PayloadExpected)
    }
}

/// Wrap a frame in a JSONP callback invocation: `callback("<frame>");`.
///
/// The frame itself is JSON string-escaped so the browser receives it as a
/// single string argument.
pub fn jsonp_envelope(callback: &str, frame: &str) -> String {
    format!("{callback}({});\r\n", json_quote(frame))
}

/// Wrap a frame in an inline script chunk for the htmlfile transport.
pub fn htmlfile_chunk(frame: &str) -> String {
    format!("<script>\np({});\n</script>\r\n", json_quote(frame))
}

/// The [`PRELUDE_SIZE`]-byte heartbeat-character prelude plus a trailing
/// newline, shared by all callers.
pub fn streaming_prelude() -> Bytes {
    static PRELUDE: OnceLock<Bytes> = OnceLock::new();
    PRELUDE
        .get_or_init(|| {
            let mut buf = Vec::with_capacity(PRELUDE_SIZE + 1);
            buf.resize(PRELUDE_SIZE, b'h');
            buf.push(b'\n');
            Bytes::from(buf)
        })
        .clone()
}
