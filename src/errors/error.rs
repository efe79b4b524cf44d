//! Error types for the reliability layer.

use crate::resilience::CircuitBreakerStats;
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for guarded operations
pub type ReliabilityResult<T> = Result<T, ReliabilityError>;

/// Main error type for guarded calls.
///
/// Dependency failures (`RateLimit`, `Server`, `Client`, `Network`, `Timeout`)
/// are kept apart from the local `CircuitOpen` decision so that callers can
/// tell "request failed" from "service temporarily disabled".
#[derive(Error, Debug, Clone)]
pub enum ReliabilityError {
    /// Rate limit error (HTTP 429, quota exceeded)
    #[error("Rate limit error: {message}")]
    RateLimit {
        /// Error message describing the rate limit issue
        message: String,
        /// Duration to wait before retrying (if provided by the dependency)
        retry_after: Option<Duration>,
    },

    /// Server error (5xx responses)
    #[error("Server error ({status_code}): {message}")]
    Server {
        /// Error message from the server
        message: String,
        /// HTTP status code
        status_code: u16,
    },

    /// Client error (4xx responses other than 429)
    #[error("Client error ({status_code}): {message}")]
    Client {
        /// Error message from the server
        message: String,
        /// HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused or reset, DNS, socket hang up)
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// The dependency did not answer in time
    #[error("Timeout: {message}")]
    Timeout {
        /// Error message describing the timeout
        message: String,
    },

    /// The circuit breaker rejected the call without attempting it
    #[error("Circuit breaker '{name}' is open: service temporarily unavailable")]
    CircuitOpen {
        /// Name of the breaker that rejected the call
        name: String,
        /// Breaker statistics at the moment of rejection
        stats: Box<CircuitBreakerStats>,
    },

    /// Configuration error (invalid retry or breaker settings)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Internal error (anything not classified above)
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal issue
        message: String,
    },
}

impl ReliabilityError {
    /// Maps an HTTP status and message onto the taxonomy.
    ///
    /// 429 becomes `RateLimit`, 408 and 504 become `Timeout`, other 5xx become
    /// `Server`, other 4xx become `Client`. Anything else is `Internal`.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = status.as_u16();
        match code {
            429 => ReliabilityError::RateLimit {
                message,
                retry_after: None,
            },
            408 | 504 => ReliabilityError::Timeout { message },
            500..=599 => ReliabilityError::Server {
                message,
                status_code: code,
            },
            400..=499 => ReliabilityError::Client {
                message,
                status_code: code,
            },
            _ => ReliabilityError::Internal {
                message: format!("unexpected status {}: {}", code, message),
            },
        }
    }

    /// Creates a `CircuitOpen` rejection from a breaker snapshot.
    pub fn circuit_open(stats: CircuitBreakerStats) -> Self {
        ReliabilityError::CircuitOpen {
            name: stats.name.clone(),
            stats: Box::new(stats),
        }
    }

    /// Returns true if the default classifier considers this error transient.
    ///
    /// Retryable errors include:
    /// - Rate limit errors (429)
    /// - Server errors (5xx)
    /// - Network errors and timeouts
    /// - Internal errors whose message carries a transient network signature
    pub fn is_retryable(&self) -> bool {
        match self {
            ReliabilityError::RateLimit { .. }
            | ReliabilityError::Network { .. }
            | ReliabilityError::Timeout { .. } => true,
            ReliabilityError::Server { status_code, .. } => {
                super::is_retryable_status(*status_code)
            }
            ReliabilityError::Internal { message } => super::is_transient_message(message),
            ReliabilityError::Client { .. }
            | ReliabilityError::CircuitOpen { .. }
            | ReliabilityError::Configuration { .. } => false,
        }
    }

    /// Returns true if this is a local circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ReliabilityError::CircuitOpen { .. })
    }

    /// Returns the HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ReliabilityError::RateLimit { .. } => Some(429),
            ReliabilityError::Server { status_code, .. }
            | ReliabilityError::Client { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Returns the retry-after hint if the dependency provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ReliabilityError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short, stable identifier used in logs, metrics and telemetry records.
    pub fn error_type(&self) -> &'static str {
        match self {
            ReliabilityError::RateLimit { .. } => "rate_limit",
            ReliabilityError::Server { .. } => "server",
            ReliabilityError::Client { .. } => "client",
            ReliabilityError::Network { .. } => "network",
            ReliabilityError::Timeout { .. } => "timeout",
            ReliabilityError::CircuitOpen { .. } => "circuit_open",
            ReliabilityError::Configuration { .. } => "configuration",
            ReliabilityError::Internal { .. } => "internal",
        }
    }
}

impl From<reqwest::Error> for ReliabilityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ReliabilityError::Timeout {
                message: format!("Request timed out: {}", err),
            }
        } else if err.is_connect() {
            ReliabilityError::Network {
                message: format!("Connection failed: {}", err),
            }
        } else if let Some(status) = err.status() {
            ReliabilityError::from_status(status, err.to_string())
        } else if err.is_request() || err.is_body() {
            ReliabilityError::Network {
                message: format!("Network error: {}", err),
            }
        } else {
            ReliabilityError::Internal {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ReliabilityError {
    fn from(err: serde_json::Error) -> Self {
        ReliabilityError::Internal {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}
