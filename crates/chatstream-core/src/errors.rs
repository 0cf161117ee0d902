use crate::adapters::AdapterId;

/// Failures of the HTTP transport underneath an adapter.
///
/// These never reach the event sequence directly: adapters turn them into a
/// synthesized error frame, and byte-stream read failures end the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (DNS, connect, TLS, timeout).
    #[error("request failed: {message}")]
    Request { message: String },
    /// Reading the response body failed mid-stream.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a body read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        Self::request(value.to_string())
    }
}

/// Top-level error type for the public setup API.
///
/// Only builder/registry setup can fail; once a turn has started, every
/// recoverable condition degrades to a `StreamEvent`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatStreamError {
    /// Invalid adapter or pipeline configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input to a builder.
    #[error("validation error: {0}")]
    Validation(String),
    /// Requested adapter is not registered.
    #[error("adapter not found: {adapter}")]
    AdapterNotFound { adapter: AdapterId },
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatStreamError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
