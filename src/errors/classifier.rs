//! Retry-worthiness predicates.

use super::ReliabilityError;
use std::sync::Arc;

/// Predicate deciding whether a failed attempt may be retried.
pub type RetryPredicate = Arc<dyn Fn(&ReliabilityError) -> bool + Send + Sync>;

/// Message fragments that identify transient network faults.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "timeout",
    "timed out",
    "econnreset",
    "connection reset",
    "socket hang up",
    "network",
];

/// Default classifier: rate limiting, server errors and network faults retry.
pub fn default_retry_predicate(error: &ReliabilityError) -> bool {
    error.is_retryable()
}

/// Classifier that never retries.
pub fn never_retry(_error: &ReliabilityError) -> bool {
    false
}

/// Returns true for HTTP 429 and every 5xx status.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Returns true if `message` carries a transient network fault signature.
pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TRANSIENT_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}
