//! # sockrs-protocol
//!
//! Wire framing codec for the SockJS emulated-socket protocol.
//!
//! Every SockJS transport, whatever its envelope (raw WebSocket frames,
//! chunked HTTP, JSONP callbacks, inline `<script>` chunks), exchanges the
//! same four frame kinds:
//!
//! ```text
//! open      := "o"
//! heartbeat := "h"
//! close     := "c[" INT "," STRING "]"
//! message   := "a[" STRING ("," STRING)* "]"
//! ```
//!
//! All `STRING` payloads are JSON string-escaped. This crate is pure:
//! no I/O, no async, safe to call from any thread.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod error;
mod frame;

pub use error::DecodeError;
pub use frame::{
    CloseReason, DATA_FRAME, HEARTBEAT_FRAME, OPEN_FRAME, PRELUDE_SIZE, decode_data_frame,
    encode_close, encode_data_frame, encode_data_frames, htmlfile_chunk, json_quote,
    jsonp_envelope, streaming_prelude,
};
