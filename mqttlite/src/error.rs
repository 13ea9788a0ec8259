//! Error types for mqttlite.

use std::io;

use bytes::Bytes;

/// Result type alias for mqttlite.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by message callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for mqttlite operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Connection closed by peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// The broker answered a handshake step with unexpected bytes.
    #[error("{step} handshake failed: expected {}, got {}", hex::encode(.expected), hex::encode(.got))]
    HandshakeFailed {
        step: &'static str,
        expected: Bytes,
        got: Bytes,
    },

    /// Inbound message type the client does not dispatch.
    #[error("unhandled message type: {0}")]
    UnhandledMessageType(u8),

    /// Remaining length used more than four bytes.
    #[error("malformed remaining length")]
    MalformedLength,

    /// Remaining length does not fit in 28 bits.
    #[error("size too large: {0}")]
    SizeTooLarge(usize),

    /// Publish body shorter than its declared topic length.
    #[error("body too short: topic length {declared}, {available} bytes available")]
    BodyTooShort { declared: usize, available: usize },

    /// String field longer than a 2-byte length prefix can carry.
    #[error("string too long: {0} bytes")]
    StringTooLong(usize),

    /// Topic is not valid UTF-8.
    #[error("invalid utf-8 in topic")]
    InvalidUtf8,

    /// Inbound packet exceeds the configured maximum.
    #[error("packet too large: {size} > {max}")]
    PacketTooLarge { size: usize, max: usize },

    /// Publish payload is not valid JSON.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The message callback failed.
    #[error("callback failed: {0}")]
    Callback(BoxError),

    /// Session operation invoked in the wrong state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Timeout error.
    #[error("timeout: {0}")]
    Timeout(String),
}
