//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for run-level failures (configuration and
//! persistence) and [`TransportError`] for the per-request transport
//! failures that are folded into outcomes instead of being raised.

use crate::loadtest::outcome::ErrorKind;

/// Errors that occur during run configuration, validation, or persistence.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero concurrency, unsupported scheme).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The run store could not read or write a run record.
    #[error("Run store error at '{path}': {source}")]
    Persistence {
        source: std::io::Error,
        path: String,
    },

    /// A run record could not be encoded or decoded.
    #[error("Failed to serialize run record: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// A progress sink could not deliver an event.
    #[error("Progress sink error: {message}")]
    Sink { message: String },

    /// The aggregator rejected an operation.
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
}

impl LoadTestError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised before any request was dispatched.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } | Self::ConfigIo { .. }
        )
    }
}

/// Errors raised by the [`Aggregator`](crate::loadtest::aggregator::Aggregator).
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorError {
    /// `record` or `finalize` was called after the summary was produced.
    #[error("aggregator already finalized")]
    Finalized,
}

/// Transport-level failure of a single request.
///
/// These never abort a run; the dispatcher turns each one into an
/// [`Outcome`](crate::loadtest::outcome::Outcome) carrying its [`ErrorKind`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request exceeded the configured per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The peer answered with something that is not valid HTTP, or the
    /// response body was cut short.
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Returns the outcome classification for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::Protocol { .. } => ErrorKind::ProtocolError,
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`TransportError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() || err.is_request() {
            Self::Protocol {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_kind_timeout() {
        assert_eq!(TransportError::Timeout.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_transport_error_kind_connection() {
        let err = TransportError::Connection {
            message: "connection refused".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[test]
    fn test_transport_error_kind_protocol() {
        let err = TransportError::Protocol {
            message: "invalid status line".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }

    #[test]
    fn test_config_errors_are_flagged() {
        assert!(LoadTestError::validation("bad").is_config_error());
        let err = LoadTestError::ConfigIo {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            path: "run.toml".to_string(),
        };
        assert!(err.is_config_error());
        assert!(!LoadTestError::from(AggregatorError::Finalized).is_config_error());
    }

    #[test]
    fn test_validation_message_is_displayed() {
        let err = LoadTestError::validation("concurrency must be at least 1");
        assert_eq!(
            err.to_string(),
            "Config validation error: concurrency must be at least 1"
        );
    }
}
