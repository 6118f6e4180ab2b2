use thiserror::Error;

use crate::framing::MessageKind;

/// Failure while decoding protobuf-encoded payload bytes.
///
/// Once field alignment is lost inside a payload there is no way to
/// resynchronize, so these are fatal for the message and, in practice, for
/// the connection that produced it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ended before the current field was complete.
    #[error("payload ended mid-field")]
    Truncated,
    /// A field violated the wire format in a way that is not recoverable.
    #[error("malformed field: {0}")]
    Malformed(&'static str),
    /// A wire type this client does not know how to measure or skip.
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u32),
}

/// Failure while framing messages on the control channel.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream; expected during shutdown, fatal otherwise.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The prefix declared a message larger than the receive buffer.
    #[error("message of {declared} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { declared: usize, limit: usize },
    /// Underlying stream failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide error type capturing common failure cases.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input parameters failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Networking failure while communicating with the server.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
    /// Message framing failure on the control channel.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    /// Payload decoding failed for the given message kind.
    #[error("failed to decode {kind:?}: {source}")]
    Decode {
        /// Message kind whose payload failed to decode.
        kind: MessageKind,
        /// Underlying wire-format error.
        #[source]
        source: DecodeError,
    },
    /// Server rejected the connection attempt.
    #[error("server rejected connection: {0}")]
    Rejected(String),
}
