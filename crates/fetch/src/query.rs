//! Result codes reported for one request.

use thiserror::Error;

/// Failure below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection reset by peer")]
    Reset,

    #[error("reply dropped before completion")]
    Dropped,
}

/// Outcome of one request, as seen by the fetch loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryCode {
    #[error("success")]
    Success,

    /// Non-2xx HTTP status.
    #[error("http error {0}")]
    HttpError(u16),

    /// The response body could not be decoded.
    #[error("parse error")]
    ParseError,

    /// Post-processing of a decoded reply failed.
    #[error("process error")]
    ProcessError,

    /// Internal contract violation in the transport.
    #[error("system error")]
    SystemError,

    #[error("transport failure: {0}")]
    Transport(TransportFailure),
}

impl QueryCode {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryCode::Success)
    }

    /// Whether a failure with this code may be retried.
    ///
    /// HTTP and transport failures are transient; everything that points at
    /// a bad payload or a broken contract is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryCode::HttpError(_) | QueryCode::Transport(_))
    }
}

impl From<TransportFailure> for QueryCode {
    fn from(value: TransportFailure) -> Self {
        QueryCode::Transport(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_splits_transient_from_structural() {
        assert!(QueryCode::HttpError(503).is_retryable());
        assert!(QueryCode::HttpError(404).is_retryable());
        assert!(QueryCode::Transport(TransportFailure::Timeout).is_retryable());

        assert!(!QueryCode::ParseError.is_retryable());
        assert!(!QueryCode::ProcessError.is_retryable());
        assert!(!QueryCode::SystemError.is_retryable());
        assert!(!QueryCode::Success.is_retryable());
    }

    #[test]
    fn display_is_lower_case() {
        assert_eq!(QueryCode::HttpError(429).to_string(), "http error 429");
        assert_eq!(
            QueryCode::from(TransportFailure::Reset).to_string(),
            "transport failure: connection reset by peer"
        );
    }
}
