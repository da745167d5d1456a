//! Per-request outcome record.
//!
//! Every dispatched request produces exactly one [`Outcome`], whether the
//! target answered (with any status) or the transport failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification of a transport-level failure.
///
/// The [`fmt::Display`] impl produces the key used in the status
/// distribution (e.g., `"timeout"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request exceeded the per-request timeout.
    Timeout,
    /// DNS, TCP connect, or TLS failure.
    ConnectionError,
    /// Malformed response or truncated body.
    ProtocolError,
}

impl ErrorKind {
    /// Returns the wire-format name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::ProtocolError => "protocol_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable result of one dispatched request.
///
/// Built via [`Outcome::response`] or [`Outcome::transport_failure`]; the
/// success flag is derived at construction and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Position in the issued-request stream. Debugging only; outcomes are
    /// recorded in completion order, not index order.
    pub sequence_index: u32,
    /// HTTP status, absent when the transport failed.
    pub status_code: Option<u16>,
    /// Wall time from dispatch to response completion (or failure).
    pub latency_ms: f64,
    /// Transport failure classification, absent when a response arrived.
    pub error_kind: Option<ErrorKind>,
    /// `true` iff a status arrived and it is in `200..success_status_ceiling`.
    pub is_success: bool,
}

impl Outcome {
    /// Outcome for a request that received an HTTP response.
    ///
    /// `success_status_ceiling` is the exclusive upper bound of the success
    /// range; 400 classifies 2xx and 3xx as success.
    pub fn response(
        sequence_index: u32,
        status_code: u16,
        latency: Duration,
        success_status_ceiling: u16,
    ) -> Self {
        Self {
            sequence_index,
            status_code: Some(status_code),
            latency_ms: duration_ms(latency),
            error_kind: None,
            is_success: (200..success_status_ceiling).contains(&status_code),
        }
    }

    /// Outcome for a request whose transport failed.
    pub fn transport_failure(sequence_index: u32, kind: ErrorKind, latency: Duration) -> Self {
        Self {
            sequence_index,
            status_code: None,
            latency_ms: duration_ms(latency),
            error_kind: Some(kind),
            is_success: false,
        }
    }

    /// Key under which this outcome is counted in the status distribution:
    /// the numeric status (`"503"`) or the error kind (`"timeout"`).
    pub fn status_bucket(&self) -> String {
        match (self.status_code, self.error_kind) {
            (Some(code), _) => code.to_string(),
            (None, Some(kind)) => kind.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2xx_and_3xx_are_success() {
        for code in [200, 201, 204, 301, 304, 399] {
            let o = Outcome::response(0, code, Duration::from_millis(5), 400);
            assert!(o.is_success, "{code} should be success");
        }
    }

    #[test]
    fn test_4xx_and_5xx_are_failure() {
        for code in [400, 404, 429, 500, 503] {
            let o = Outcome::response(0, code, Duration::from_millis(5), 400);
            assert!(!o.is_success, "{code} should be failure");
        }
    }

    #[test]
    fn test_1xx_is_failure() {
        let o = Outcome::response(0, 101, Duration::from_millis(5), 400);
        assert!(!o.is_success);
    }

    #[test]
    fn test_ceiling_is_configurable() {
        let strict = Outcome::response(0, 302, Duration::from_millis(5), 300);
        assert!(!strict.is_success);
        let lenient = Outcome::response(0, 404, Duration::from_millis(5), 500);
        assert!(lenient.is_success);
    }

    #[test]
    fn test_transport_failure_has_no_status() {
        let o = Outcome::transport_failure(7, ErrorKind::Timeout, Duration::from_millis(100));
        assert_eq!(o.status_code, None);
        assert_eq!(o.error_kind, Some(ErrorKind::Timeout));
        assert!(!o.is_success);
        assert_eq!(o.sequence_index, 7);
    }

    #[test]
    fn test_latency_in_milliseconds() {
        let o = Outcome::response(0, 200, Duration::from_micros(12_500), 400);
        assert!((o.latency_ms - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_status_bucket_keys() {
        let ok = Outcome::response(0, 503, Duration::ZERO, 400);
        assert_eq!(ok.status_bucket(), "503");
        let conn = Outcome::transport_failure(0, ErrorKind::ConnectionError, Duration::ZERO);
        assert_eq!(conn.status_bucket(), "connection_error");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ProtocolError).unwrap();
        assert_eq!(json, "\"protocol_error\"");
    }
}
