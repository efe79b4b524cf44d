//! # Integrations Reliability
//!
//! Retry and circuit breaking for calls to unreliable external services such
//! as model inference APIs and wearable device clouds.
//!
//! ## Features
//!
//! - Jittered exponential backoff with a pluggable retry predicate
//! - Per-dependency circuit breakers with a single half-open probe
//! - One breaker outcome per logical call, however many retries it took
//! - Process-wide registry of named breakers with built-in presets
//! - Client decoration, by hand or generated with [`resilient_impl!`]
//! - `tracing` logs, metrics and optional per-call telemetry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_reliability::resilience::{BreakerRegistry, ResilienceOrchestrator, RetryConfig};
//! use integrations_reliability::{ReliabilityError, ReliabilityResult};
//!
//! #[tokio::main]
//! async fn main() -> ReliabilityResult<()> {
//!     let breaker = BreakerRegistry::global()
//!         .get("model-inference")
//!         .ok_or_else(|| ReliabilityError::Configuration {
//!             message: "missing preset".to_string(),
//!         })?;
//!     let orchestrator = ResilienceOrchestrator::new(breaker, RetryConfig::default());
//!
//!     let reply = orchestrator
//!         .execute("complete", || async { Ok::<_, ReliabilityError>("pong") })
//!         .await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `resilience` - Backoff, retry, circuit breaker, orchestrator, registry
//! - `client` - Decorator applying a breaker and retry policy to a client
//! - `errors` - Error taxonomy and retry predicates
//! - `config` - Service-level configuration and environment loading
//! - `observability` - Logging setup, metrics and telemetry sinks

pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;

// Re-exports for convenience
pub use client::{wrap, Resilient};
pub use config::{ReliabilityConfig, ReliabilityConfigBuilder};
pub use errors::{ReliabilityError, ReliabilityResult};
pub use resilience::{
    execute_with_reliability, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerStats, CircuitState, ResilienceOrchestrator, RetryConfig,
};

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
}
