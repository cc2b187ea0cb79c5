//! Transport error types

use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn status(code: u16) -> Self {
        Self::new(
            TransportErrorKind::Status(code),
            format!("Server responded with status {code}"),
        )
    }

    pub fn no_body() -> Self {
        Self::new(TransportErrorKind::NoBody, "Response has no body")
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::status(status.as_u16())
        } else {
            Self::network(e.to_string())
        }
    }
}

/// Error classification for callers deciding whether to offer a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, reset, DNS failure, broken stream
    Network,
    /// Non-success HTTP status
    Status(u16),
    /// Success status but nothing to read
    NoBody,
    /// Response body was not the expected shape
    Decode,
}

impl TransportErrorKind {
    /// The core never retries on its own; this only informs the UI.
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Network => true,
            Self::Status(code) => code == 429 || code >= 500,
            Self::NoBody | Self::Decode => false,
        }
    }
}
