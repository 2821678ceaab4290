use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// How a failure should be treated by the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Swallowed while polling and retried on the next tick.
    Transient,
    /// Aborts the run.
    Fatal,
    /// Stored data could not be understood; surfaced to the caller as-is.
    MalformedData,
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics query error: {0}")]
    Query(String),

    #[error("Metrics backend unreachable: {0}")]
    MetricsUnreachable(String),

    #[error("API error: {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("No available resource for {0}")]
    NoAvailableResource(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed report: {0}")]
    MalformedReport(String),

    #[error("Timed out after {0:?} before the cluster balanced")]
    BalanceTimeout(Duration),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown case {name}, supported: {supported:?}")]
    UnknownCase {
        name: String,
        supported: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BenchError::Query(_) => ErrorClass::Transient,
            BenchError::Http(e) if e.is_timeout() || e.is_decode() => ErrorClass::Transient,
            BenchError::MalformedReport(_) | BenchError::Serialization(_) => {
                ErrorClass::MalformedData
            }
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            BenchError::Query("bad_data".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            BenchError::MetricsUnreachable("connection refused".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            BenchError::BalanceTimeout(Duration::from_secs(5)).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            BenchError::MalformedReport("expected value".into()).class(),
            ErrorClass::MalformedData
        );

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(BenchError::from(json_err).class(), ErrorClass::MalformedData);
    }

    #[test]
    fn test_display() {
        let err = BenchError::UnknownCase {
            name: "tpcc".into(),
            supported: vec!["scale-out".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown case tpcc, supported: [\"scale-out\"]"
        );
    }
}
