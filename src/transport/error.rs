//! Transport error types.
//!
//! Every transport failure ends the same way for the tracker (the event goes
//! back on the batched path for the next cycle), but the kind is kept for
//! logging so operators can tell an outage from a rejected payload:
//!
//! - **Transient**: network errors, timeouts, HTTP 408, 429 and 5xx
//! - **Permanent**: any other HTTP 4xx, or a body that cannot be encoded

use std::fmt;
use thiserror::Error;

/// The kind of transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Likely to succeed if retried later.
    Transient,

    /// The backend rejected the request; retrying unchanged will likely fail.
    Permanent,
}

impl TransportErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportErrorKind::Transient)
    }

    /// Categorizes an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 429 => TransportErrorKind::Transient,
            500..=599 => TransportErrorKind::Transient,
            _ => TransportErrorKind::Permanent,
        }
    }
}

/// A failed `track` or `track-batch` call.
#[derive(Debug, Error)]
pub struct TransportError {
    pub kind: TransportErrorKind,

    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    pub message: String,

    /// The underlying HTTP client error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "transport error (HTTP {}): {}", code, self.message),
            None => write!(f, "transport error: {}", self.message),
        }
    }
}

impl TransportError {
    /// Creates a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error without an underlying source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error from a non-success HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::from_status(status),
            status_code: Some(status),
            message: message.into(),
            source: None,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let status_code = e.status().map(|s| s.as_u16());
        let kind = match status_code {
            Some(code) => TransportErrorKind::from_status(code),
            // Encoding problems are on our side and will not fix themselves.
            None if e.is_builder() || e.is_body() => TransportErrorKind::Permanent,
            None => TransportErrorKind::Transient,
        };
        Self {
            kind,
            status_code,
            message: e.to_string(),
            source: Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [408, 429, 500, 502, 503, 599] {
            assert_eq!(
                TransportErrorKind::from_status(status),
                TransportErrorKind::Transient,
                "status {status}"
            );
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 413, 422] {
            assert_eq!(
                TransportErrorKind::from_status(status),
                TransportErrorKind::Permanent,
                "status {status}"
            );
        }
    }

    #[test]
    fn display_includes_status_when_present() {
        let err = TransportError::from_status(503, "service unavailable");
        assert_eq!(
            err.to_string(),
            "transport error (HTTP 503): service unavailable"
        );
        assert!(err.is_retriable());

        let err = TransportError::transient("connection reset");
        assert_eq!(err.to_string(), "transport error: connection reset");
    }
}
