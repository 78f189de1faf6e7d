//! Codec error types.

use thiserror::Error;

/// Errors produced while decoding an inbound data payload.
///
/// The two cases surface as different client-visible error texts, matching
/// how browsers' SockJS clients report them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload was not a JSON string literal or a JSON array of strings.
    #[error("Payload expected.")]
    PayloadExpected,

    /// The payload looked like JSON but failed to parse.
    #[error("Broken JSON encoding.")]
    BrokenJson(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::BrokenJson(err.to_string())
    }
}
