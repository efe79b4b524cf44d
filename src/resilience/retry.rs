//! Retry logic with exponential backoff and jitter.

use crate::errors::{
    default_retry_predicate, never_retry, ReliabilityError, ReliabilityResult, RetryPredicate,
};
use crate::resilience::backoff::calculate_backoff;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Decides whether a failed attempt may be retried
    pub retry_predicate: RetryPredicate,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_factor: 0.1,
            retry_predicate: Arc::new(default_retry_predicate),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_factor", &self.jitter_factor)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            retry_predicate: Arc::new(never_retry),
            ..Default::default()
        }
    }

    /// Sets the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Replaces the retry predicate.
    pub fn with_retry_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ReliabilityError) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Arc::new(predicate);
        self
    }

    /// Checks the configuration invariants.
    pub fn validate(&self) -> ReliabilityResult<()> {
        if self.base_delay.is_zero() {
            return Err(ReliabilityError::Configuration {
                message: "base_delay must be greater than zero".to_string(),
            });
        }
        if self.max_delay < self.base_delay {
            return Err(ReliabilityError::Configuration {
                message: format!(
                    "max_delay ({:?}) must not be below base_delay ({:?})",
                    self.max_delay, self.base_delay
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ReliabilityError::Configuration {
                message: format!(
                    "jitter_factor must be within [0, 1], got {}",
                    self.jitter_factor
                ),
            });
        }
        Ok(())
    }

    /// Returns true if the predicate allows retrying `error`.
    pub fn should_retry(&self, error: &ReliabilityError) -> bool {
        (self.retry_predicate)(error)
    }
}

/// Retry executor that handles retry logic with exponential backoff
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    retry_hook: Option<Arc<dyn RetryHook>>,
}

impl RetryExecutor {
    /// Create a new retry executor with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retry_hook: None,
        }
    }

    /// Add a retry hook for custom retry logic
    pub fn with_hook(mut self, hook: Arc<dyn RetryHook>) -> Self {
        self.retry_hook = Some(hook);
        self
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute the given operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> ReliabilityResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ReliabilityResult<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            let error = match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation = operation,
                            retries = attempt,
                            "Operation succeeded after retrying"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if attempt >= max_retries {
                if max_retries > 0 {
                    tracing::error!(
                        operation = operation,
                        attempts = attempt + 1,
                        error = %error,
                        "Retry budget exhausted"
                    );
                }
                return Err(error);
            }

            if !self.config.should_retry(&error) {
                tracing::debug!(
                    operation = operation,
                    error_type = error.error_type(),
                    "Error is not retryable"
                );
                return Err(error);
            }

            let delay = self.delay_for(attempt, &error);
            let delay = match &self.retry_hook {
                Some(hook) => {
                    let context = RetryContext {
                        attempt: attempt + 1,
                        error: error.clone(),
                        delay,
                        operation: operation.to_string(),
                    };
                    match hook.on_retry(context).await {
                        RetryDecision::Default => delay,
                        RetryDecision::Retry(custom_delay) => custom_delay,
                        RetryDecision::Abort => return Err(error),
                    }
                }
                None => delay,
            };

            tracing::warn!(
                operation = operation,
                attempt = attempt + 1,
                max_retries = max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable error, backing off"
            );

            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Backoff for the given attempt, raised to the dependency's retry-after hint.
    fn delay_for(&self, attempt: u32, error: &ReliabilityError) -> Duration {
        let calculated = calculate_backoff(
            attempt,
            self.config.base_delay,
            self.config.max_delay,
            self.config.jitter_factor,
        );

        match error.retry_after() {
            Some(server_delay) if server_delay > calculated => server_delay,
            _ => calculated,
        }
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("has_hook", &self.retry_hook.is_some())
            .finish()
    }
}

/// Hook for custom retry behavior
#[async_trait]
pub trait RetryHook: Send + Sync {
    /// Called before sleeping ahead of each retry.
    async fn on_retry(&self, context: RetryContext) -> RetryDecision;
}

/// Context information for a retry attempt
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// The retry about to happen (1-based)
    pub attempt: u32,
    /// The error that triggered the retry
    pub error: ReliabilityError,
    /// The computed delay
    pub delay: Duration,
    /// The operation being retried
    pub operation: String,
}

/// Decision on how to proceed with a retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Use the default retry behavior
    Default,
    /// Retry with a custom delay
    Retry(Duration),
    /// Abort the retry and return the error
    Abort,
}
