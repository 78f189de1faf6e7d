//! Transport error types.

use thiserror::Error;

use sockrs_protocol::DecodeError;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur while driving a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The attached channel is gone or no longer writable.
    #[error("channel is not writable")]
    ChannelClosed,

    /// A second channel tried to attach while the current one is still live.
    #[error("another connection still open")]
    AlreadyOpened,

    /// A data-submission request referenced a session id the registry does
    /// not know.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// A script-tag transport request arrived without its callback parameter.
    #[error("\"callback\" parameter required")]
    MissingCallback,

    /// Inbound payload failed JSON-shape decoding.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
