//! Retry, circuit breaking and their composition.
//!
//! The [`CircuitBreaker`] decides whether a call may be attempted at all, the
//! [`RetryExecutor`] absorbs transient failures inside a permitted call, and
//! the [`ResilienceOrchestrator`] ties both together so the breaker sees one
//! outcome per logical call. Breakers are shared by name through a
//! [`BreakerRegistry`].

mod backoff;
mod circuit_breaker;
mod orchestrator;
pub mod presets;
mod registry;
mod retry;

#[cfg(test)]
mod tests;

pub use backoff::{calculate_backoff, calculate_backoff_with_rng};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHook, CircuitBreakerStats, CircuitState,
};
pub use orchestrator::{
    execute_with_reliability, ResilienceOrchestrator, ResilienceOrchestratorBuilder,
};
pub use registry::BreakerRegistry;
pub use retry::{RetryConfig, RetryContext, RetryDecision, RetryExecutor, RetryHook};
