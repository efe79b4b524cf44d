//! Transparent reliability for whole client objects.
//!
//! [`Resilient<C>`] is a decorator holding the wrapped client and an
//! orchestrator. Individual methods are routed through [`Resilient::call`];
//! for a client exposed through an `async_trait` trait,
//! [`resilient_impl!`](crate::resilient_impl) generates the forwarding
//! implementation so callers keep using the trait unchanged.
//!
//! ```no_run
//! use integrations_reliability::client::wrap;
//! use integrations_reliability::resilience::{BreakerRegistry, RetryConfig};
//! use integrations_reliability::ReliabilityResult;
//!
//! struct DeviceCloud;
//!
//! impl DeviceCloud {
//!     async fn battery_level(&self, device_id: &str) -> ReliabilityResult<u8> {
//!         # let _ = device_id;
//!         Ok(87)
//!     }
//! }
//!
//! # async fn run() -> ReliabilityResult<()> {
//! let breaker = BreakerRegistry::global()
//!     .get("wearable-cloud")
//!     .expect("preset is registered");
//! let cloud = wrap(DeviceCloud, breaker, RetryConfig::default());
//! let level = cloud.call("battery_level", |c| c.battery_level("band-7")).await?;
//! # let _ = level;
//! # Ok(())
//! # }
//! ```

mod macros;

use crate::errors::ReliabilityResult;
use crate::resilience::{CircuitBreaker, ResilienceOrchestrator, RetryConfig};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Wraps `client` so that calls made through it are guarded by `breaker` and
/// retried according to `retry_config`.
pub fn wrap<C>(client: C, breaker: Arc<CircuitBreaker>, retry_config: RetryConfig) -> Resilient<C> {
    Resilient::new(
        Arc::new(client),
        ResilienceOrchestrator::new(breaker, retry_config),
    )
}

/// A client decorated with a circuit breaker and retry policy.
pub struct Resilient<C> {
    inner: Arc<C>,
    orchestrator: ResilienceOrchestrator,
}

impl<C> Resilient<C> {
    /// Decorates a shared client with an existing orchestrator.
    pub fn new(inner: Arc<C>, orchestrator: ResilienceOrchestrator) -> Self {
        Self {
            inner,
            orchestrator,
        }
    }

    /// The undecorated client. Calls made on it bypass the breaker.
    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    /// The orchestrator guarding this client.
    pub fn orchestrator(&self) -> &ResilienceOrchestrator {
        &self.orchestrator
    }

    /// Runs one client method through the breaker and retry policy.
    ///
    /// `f` is invoked once per attempt, so any arguments it captures must be
    /// reusable.
    pub async fn call<'a, F, Fut, T>(&'a self, operation: &str, f: F) -> ReliabilityResult<T>
    where
        F: Fn(&'a C) -> Fut,
        Fut: Future<Output = ReliabilityResult<T>>,
    {
        let client: &'a C = &self.inner;
        self.orchestrator.execute(operation, || f(client)).await
    }

    /// Wraps a nested member with the same breaker and retry policy.
    ///
    /// ```no_run
    /// # use integrations_reliability::client::wrap;
    /// # use integrations_reliability::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
    /// # use std::sync::Arc;
    /// # #[derive(Clone)] struct Activity;
    /// # struct Cloud { activity: Activity }
    /// # let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::wearable_cloud()));
    /// let cloud = wrap(Cloud { activity: Activity }, breaker, RetryConfig::default());
    /// let activity = cloud.scope(|c| c.activity.clone());
    /// ```
    pub fn scope<S, F>(&self, select: F) -> Resilient<S>
    where
        F: FnOnce(&C) -> S,
    {
        Resilient {
            inner: Arc::new(select(&self.inner)),
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl<C> Clone for Resilient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl<C> fmt::Debug for Resilient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resilient")
            .field("client", &std::any::type_name::<C>())
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}
