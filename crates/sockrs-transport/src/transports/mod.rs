//! The transport contract and its five wire implementations.
//!
//! Every variant satisfies the same capability set over a [`Connection`]:
//! emit the open frame, emit heartbeats, deliver message batches, deliver
//! the close frame. What differs is the framing envelope and the delivery
//! model: one persistent full-duplex channel, a long-lived chunked
//! response, or one response per batch.

use std::fmt;

use crate::connection::Connection;
use crate::error::TransportResult;

use sockrs_protocol::CloseReason;

mod eventsource;
mod htmlfile;
mod jsonp;
mod polling;
mod socket;
mod streaming;

pub use eventsource::EventSource;
pub use htmlfile::HtmlFile;
pub use jsonp::JsonPolling;
pub use polling::XhrPolling;
pub use socket::{RawSocket, Socket};
pub use streaming::XhrStreaming;

/// Identifies a wire transport variant. The display form matches the URL
/// token routing resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Full-duplex WebSocket.
    WebSocket,
    /// Long-lived chunked XHR response.
    XhrStreaming,
    /// One batch per XHR request.
    XhrPolling,
    /// Long-lived `text/event-stream` response.
    EventSource,
    /// One batch per request, wrapped in a script callback.
    JsonPolling,
    /// Long-lived HTML document streaming inline script chunks.
    HtmlFile,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => write!(f, "websocket"),
            Self::XhrStreaming => write!(f, "xhr_streaming"),
            Self::XhrPolling => write!(f, "xhr"),
            Self::EventSource => write!(f, "eventsource"),
            Self::JsonPolling => write!(f, "jsonp"),
            Self::HtmlFile => write!(f, "htmlfile"),
        }
    }
}

/// The capability set every wire transport implements.
///
/// All sends are fire-and-forget against the attached channel; nothing here
/// blocks. Implementations own their framing envelope, the sent-byte
/// accounting for long-lived responses, and the decision to recycle or
/// finish the channel after a write.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Which variant this is.
    fn kind(&self) -> TransportKind;

    /// Emit the open frame on the attached channel.
    fn send_open(&self, connection: &Connection) -> TransportResult<()>;

    /// Emit a heartbeat frame. Heartbeats are not counted against the
    /// stream-size budget.
    fn send_heartbeat(&self, connection: &Connection) -> TransportResult<()>;

    /// Deliver a drained batch of messages as one data frame.
    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()>;

    /// Deliver the close frame and drive the Connection to `Closed`.
    fn send_close(&self, connection: &Connection, reason: CloseReason) -> TransportResult<()>;
}

/// Count `written` against the stream budget; past the threshold, reset the
/// counter and recycle the channel so the client reconnects with a fresh
/// request. The Connection and its buffer survive.
pub(crate) fn account_stream_bytes(connection: &Connection, written: usize, max_stream_size: usize) {
    if connection.add_sent_bytes(written) > max_stream_size {
        tracing::debug!(
            session = %connection.session_id(),
            max_stream_size,
            "stream budget exhausted, recycling"
        );
        connection.reset_sent_bytes();
        connection.recycle_channel();
    }
}

/// Deliver the close frame, then settle the Connection: flushed close means
/// `Closed` (and registry eviction); a dead channel means the reason stays
/// pending for the next reattach.
pub(crate) fn settle_close(
    connection: &Connection,
    write_result: TransportResult<usize>,
) -> TransportResult<()> {
    match write_result {
        Ok(_) => {
            connection.mark_closed();
            Ok(())
        }
        Err(err) => {
            connection.recycle_channel();
            Err(err)
        }
    }
}
