//! Error types for the relay.
//!
//! Library code returns [`Result`]; the `relay` binary wraps these in
//! `anyhow` at the edges. The HTTP server collapses every variant except
//! [`RelayError::Validation`] into a `500` with the message as `detail`.

use thiserror::Error;

/// Result type alias using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound payload does not match the expected request shape.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// An upstream service answered with a non-success status.
    #[error("{service} API error {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// A referenced resource (e.g. a buffered upload file) is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing credentials or an unusable configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    pub fn upstream(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status,
            body: body.into(),
        }
    }

    /// Upstream status code, if this error came from a non-success response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_carries_status_and_body() {
        let err = RelayError::upstream("Ragie", 503, "retrieval backend unavailable");
        assert_eq!(
            err.to_string(),
            "Ragie API error 503: retrieval backend unavailable"
        );
        assert_eq!(err.upstream_status(), Some(503));
    }

    #[test]
    fn non_upstream_errors_have_no_status() {
        let err = RelayError::NotFound("/tmp/missing".into());
        assert_eq!(err.upstream_status(), None);
        assert_eq!(err.to_string(), "Not found: /tmp/missing");
    }
}
