//! Error Classification
//!
//! Maps arbitrary failures onto a fixed set of kinds, each with a default
//! retry policy.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// == Error Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Timeout,
    /// 5xx-equivalent
    Server,
    /// 429-equivalent
    RateLimit,
    /// 401/403-equivalent
    Authentication,
    /// Other 4xx-equivalent
    Client,
    Validation,
    Unknown,
}

impl ErrorKind {
    /// Default retry policy for this kind.
    ///
    /// Only network, timeout, server and rate-limit failures are retryable.
    pub fn default_policy(self) -> RetryPolicy {
        match self {
            ErrorKind::Network => RetryPolicy::retryable(3),
            ErrorKind::Timeout => RetryPolicy::retryable(2),
            ErrorKind::Server => RetryPolicy::retryable(2),
            ErrorKind::RateLimit => {
                RetryPolicy::retryable(5).with_base_delay(Duration::from_millis(5000))
            }
            ErrorKind::Authentication
            | ErrorKind::Client
            | ErrorKind::Validation
            | ErrorKind::Unknown => RetryPolicy::never(),
        }
    }

    pub fn is_retryable(self) -> bool {
        self.default_policy().retryable
    }

    /// Kind implied by an HTTP-style status code, if any.
    pub fn from_status(status: u16) -> Option<ErrorKind> {
        match status {
            500..=u16::MAX => Some(ErrorKind::Server),
            429 => Some(ErrorKind::RateLimit),
            401 | 403 => Some(ErrorKind::Authentication),
            400..=499 => Some(ErrorKind::Client),
            _ => None,
        }
    }

    /// Kind named by an explicit error code such as `NETWORK_ERROR` or `TIMEOUT`.
    pub fn from_code(code: &str) -> Option<ErrorKind> {
        let code = code.trim().to_ascii_uppercase();
        let code = code.strip_suffix("_ERROR").unwrap_or(&code);
        match code {
            "NETWORK" => Some(ErrorKind::Network),
            "TIMEOUT" => Some(ErrorKind::Timeout),
            "SERVER" => Some(ErrorKind::Server),
            "RATE_LIMIT" => Some(ErrorKind::RateLimit),
            "AUTHENTICATION" => Some(ErrorKind::Authentication),
            "CLIENT" => Some(ErrorKind::Client),
            "VALIDATION" => Some(ErrorKind::Validation),
            "UNKNOWN" => Some(ErrorKind::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Server => "SERVER",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Client => "CLIENT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Retry Policy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub retryable: bool,
    pub max_retries: u32,
    /// Overrides the executor's initial backoff delay
    pub base_delay: Option<Duration>,
}

impl RetryPolicy {
    pub const fn retryable(max_retries: u32) -> Self {
        Self {
            retryable: true,
            max_retries,
            base_delay: None,
        }
    }

    pub const fn never() -> Self {
        Self {
            retryable: false,
            max_retries: 0,
            base_delay: None,
        }
    }

    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }
}

// == Classify ==
/// Implemented by error types the recovery executor can classify.
///
/// An explicit kind wins over a status code; with neither the error is
/// `Unknown`.
pub trait Classify {
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }

    fn status_code(&self) -> Option<u16> {
        None
    }
}

/// Classifies `error`.
pub fn classify<E: Classify + ?Sized>(error: &E) -> ErrorKind {
    error
        .error_kind()
        .or_else(|| error.status_code().and_then(ErrorKind::from_status))
        .unwrap_or(ErrorKind::Unknown)
}

// == Operation Error ==
/// General-purpose error for fetch operations, carrying an optional kind
/// and status for classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub kind: Option<ErrorKind>,
    pub status: Option<u16>,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: None,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Builds an error from a string code; unrecognised codes stay unclassified.
    pub fn with_code(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_code(code),
            status: None,
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            status: None,
            message: message.into(),
        }
    }
}

impl Classify for OperationError {
    fn error_kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    fn status_code(&self) -> Option<u16> {
        self.status
    }
}

impl Classify for io::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self.kind() {
            io::ErrorKind::TimedOut => Some(ErrorKind::Timeout),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => Some(ErrorKind::Network),
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                Some(ErrorKind::Validation)
            }
            io::ErrorKind::PermissionDenied => Some(ErrorKind::Authentication),
            _ => None,
        }
    }
}

impl Classify for tokio::time::error::Elapsed {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(ErrorKind::Timeout)
    }
}

impl Classify for String {}

impl Classify for &str {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorKind::from_status(503), Some(ErrorKind::Server));
        assert_eq!(ErrorKind::from_status(500), Some(ErrorKind::Server));
        assert_eq!(ErrorKind::from_status(429), Some(ErrorKind::RateLimit));
        assert_eq!(ErrorKind::from_status(401), Some(ErrorKind::Authentication));
        assert_eq!(ErrorKind::from_status(403), Some(ErrorKind::Authentication));
        assert_eq!(ErrorKind::from_status(404), Some(ErrorKind::Client));
        assert_eq!(ErrorKind::from_status(302), None);
    }

    #[test]
    fn test_explicit_kind_wins_over_status() {
        let err = OperationError {
            kind: Some(ErrorKind::Validation),
            status: Some(503),
            message: "bad payload".to_string(),
        };
        assert_eq!(classify(&err), ErrorKind::Validation);
    }

    #[test]
    fn test_fallback_is_unknown() {
        assert_eq!(classify(&OperationError::message("boom")), ErrorKind::Unknown);
        assert_eq!(classify(&"boom".to_string()), ErrorKind::Unknown);
        assert_eq!(classify(&OperationError::with_status(302, "moved")), ErrorKind::Unknown);
    }

    #[test]
    fn test_codes() {
        assert_eq!(ErrorKind::from_code("NETWORK_ERROR"), Some(ErrorKind::Network));
        assert_eq!(ErrorKind::from_code("timeout"), Some(ErrorKind::Timeout));
        assert_eq!(ErrorKind::from_code("RATE_LIMIT_ERROR"), Some(ErrorKind::RateLimit));
        assert_eq!(ErrorKind::from_code("PGRST116"), None);
        assert_eq!(
            classify(&OperationError::with_code("NETWORK_ERROR", "offline")),
            ErrorKind::Network
        );
    }

    #[test]
    fn test_default_policies() {
        let retryable = [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::Server,
            ErrorKind::RateLimit,
        ];
        let terminal = [
            ErrorKind::Authentication,
            ErrorKind::Client,
            ErrorKind::Validation,
            ErrorKind::Unknown,
        ];

        assert!(retryable.iter().all(|k| k.is_retryable()));
        assert!(terminal.iter().all(|k| !k.is_retryable()));
        assert_eq!(
            ErrorKind::RateLimit.default_policy().base_delay,
            Some(Duration::from_millis(5000))
        );
        assert_eq!(ErrorKind::Network.default_policy().max_retries, 3);
    }

    #[test]
    fn test_io_errors() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        let other = io::Error::other("disk");

        assert_eq!(classify(&refused), ErrorKind::Network);
        assert_eq!(classify(&timed_out), ErrorKind::Timeout);
        assert_eq!(classify(&other), ErrorKind::Unknown);
    }

    #[test]
    fn test_kind_serializes_screaming() {
        let json = serde_json::to_string(&ErrorKind::RateLimit).unwrap();
        assert_eq!(json, "\"RATE_LIMIT\"");
    }
}
