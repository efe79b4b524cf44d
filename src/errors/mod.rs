//! Error types for the reliability layer.
//!
//! This module provides the error taxonomy shared by guarded operations and the
//! predicates that decide whether a failure is worth retrying.

mod classifier;
mod error;

pub use classifier::{
    default_retry_predicate, is_retryable_status, is_transient_message, never_retry,
    RetryPredicate,
};
pub use error::{ReliabilityError, ReliabilityResult};
