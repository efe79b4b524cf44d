//! Composition of circuit breaking and retry into one call contract.

use crate::errors::{ReliabilityError, ReliabilityResult};
use crate::observability::{
    metric_names, CallContext, CallRecord, MetricsCollector, NoopMetricsCollector, TelemetrySink,
};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState, Permit};
use crate::resilience::retry::{RetryConfig, RetryExecutor, RetryHook};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Runs `f` once through `breaker` with the given retry policy.
///
/// The breaker gates the first attempt only. Retries happen inside the
/// permitted call, and the overall outcome is reported to the breaker exactly
/// once.
pub async fn execute_with_reliability<F, Fut, T>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    f: F,
) -> ReliabilityResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ReliabilityResult<T>>,
{
    let executor = RetryExecutor::new(retry_config.clone());
    guarded_call(breaker, &executor, "guarded_call", f).await.result
}

struct GuardedOutcome<T> {
    result: ReliabilityResult<T>,
    attempts: u32,
}

async fn guarded_call<F, Fut, T>(
    breaker: &CircuitBreaker,
    executor: &RetryExecutor,
    operation: &str,
    f: F,
) -> GuardedOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ReliabilityResult<T>>,
{
    let permit = breaker.try_acquire();
    if permit == Permit::Denied {
        tracing::warn!(
            breaker = breaker.name(),
            operation = operation,
            "Call rejected by open circuit"
        );
        return GuardedOutcome {
            result: Err(ReliabilityError::circuit_open(breaker.stats())),
            attempts: 0,
        };
    }

    let guard = ProbeGuard {
        breaker,
        holds_probe: permit == Permit::Probe,
    };
    let attempts = AtomicU32::new(0);
    let result = executor
        .execute(operation, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            f()
        })
        .await;
    guard.report(result.is_ok());

    GuardedOutcome {
        result,
        attempts: attempts.into_inner(),
    }
}

/// Reports the call outcome to the breaker, or frees the probe slot if the
/// call is dropped before finishing.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    holds_probe: bool,
}

impl ProbeGuard<'_> {
    fn report(mut self, success: bool) {
        self.holds_probe = false;
        if success {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure();
        }
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.holds_probe {
            self.breaker.release_probe();
        }
    }
}

/// Circuit breaker plus retry policy for one logical dependency.
///
/// Cheap to clone; clones share the breaker, hooks and sinks.
#[derive(Clone)]
pub struct ResilienceOrchestrator {
    breaker: Arc<CircuitBreaker>,
    retry_config: RetryConfig,
    retry_hook: Option<Arc<dyn RetryHook>>,
    metrics: Arc<dyn MetricsCollector>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl ResilienceOrchestrator {
    /// Creates an orchestrator with no metrics and no telemetry.
    pub fn new(breaker: Arc<CircuitBreaker>, retry_config: RetryConfig) -> Self {
        Self::builder(breaker).retry_config(retry_config).build()
    }

    /// Create a builder for configuring the orchestrator
    pub fn builder(breaker: Arc<CircuitBreaker>) -> ResilienceOrchestratorBuilder {
        ResilienceOrchestratorBuilder::new(breaker)
    }

    /// The guarding breaker.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The default retry policy.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Runs `f` with the default retry policy.
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> ReliabilityResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ReliabilityResult<T>>,
    {
        self.run(operation, &self.retry_config, None, f).await
    }

    /// Runs `f` with a per-call retry policy.
    pub async fn execute_with<F, Fut, T>(
        &self,
        operation: &str,
        retry_config: &RetryConfig,
        f: F,
    ) -> ReliabilityResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ReliabilityResult<T>>,
    {
        self.run(operation, retry_config, None, f).await
    }

    /// Runs `f` with the default retry policy and emits a telemetry record
    /// if a sink is configured.
    pub async fn execute_with_context<F, Fut, T>(
        &self,
        operation: &str,
        context: &CallContext,
        f: F,
    ) -> ReliabilityResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ReliabilityResult<T>>,
    {
        self.run(operation, &self.retry_config, Some(context), f)
            .await
    }

    async fn run<F, Fut, T>(
        &self,
        operation: &str,
        retry_config: &RetryConfig,
        context: Option<&CallContext>,
        f: F,
    ) -> ReliabilityResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ReliabilityResult<T>>,
    {
        let started = Instant::now();
        let mut executor = RetryExecutor::new(retry_config.clone());
        if let Some(hook) = &self.retry_hook {
            executor = executor.with_hook(hook.clone());
        }

        let outcome = guarded_call(&self.breaker, &executor, operation, f).await;
        let latency = started.elapsed();

        self.record_metrics(&outcome, latency.as_secs_f64() * 1000.0);
        if let (Some(sink), Some(context)) = (&self.telemetry, context) {
            let record = CallRecord::new(
                self.breaker.name(),
                operation,
                context,
                latency,
                outcome.attempts,
                &outcome.result,
            );
            sink.record(&record);
        }

        outcome.result
    }

    fn record_metrics<T>(&self, outcome: &GuardedOutcome<T>, latency_ms: f64) {
        let breaker = self.breaker.name();
        let state = match self.breaker.state() {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        self.metrics
            .set_gauge(metric_names::BREAKER_STATE, state, &[("breaker", breaker)]);

        if outcome.attempts == 0 {
            self.metrics
                .increment_counter(metric_names::REJECTIONS_TOTAL, 1, &[("breaker", breaker)]);
            return;
        }

        let status = if outcome.result.is_ok() {
            "success"
        } else {
            "error"
        };
        self.metrics.increment_counter(
            metric_names::CALLS_TOTAL,
            1,
            &[("breaker", breaker), ("status", status)],
        );
        if outcome.attempts > 1 {
            self.metrics.increment_counter(
                metric_names::RETRIES_TOTAL,
                u64::from(outcome.attempts - 1),
                &[("breaker", breaker)],
            );
        }
        self.metrics
            .record_histogram(metric_names::CALL_DURATION_MS, latency_ms, &[("breaker", breaker)]);

    }
}

impl fmt::Debug for ResilienceOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceOrchestrator")
            .field("breaker", &self.breaker.name())
            .field("retry_config", &self.retry_config)
            .field("has_retry_hook", &self.retry_hook.is_some())
            .field("has_telemetry", &self.telemetry.is_some())
            .finish()
    }
}

/// Builder for configuring resilience orchestrator
pub struct ResilienceOrchestratorBuilder {
    breaker: Arc<CircuitBreaker>,
    retry_config: RetryConfig,
    retry_hook: Option<Arc<dyn RetryHook>>,
    metrics: Arc<dyn MetricsCollector>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl ResilienceOrchestratorBuilder {
    /// Starts from the default retry policy, no hooks and no sinks.
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            retry_config: RetryConfig::default(),
            retry_hook: None,
            metrics: Arc::new(NoopMetricsCollector),
            telemetry: None,
        }
    }

    /// Set the retry configuration
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Set a hook consulted before every retry
    pub fn retry_hook(mut self, hook: Arc<dyn RetryHook>) -> Self {
        self.retry_hook = Some(hook);
        self
    }

    /// Set the metrics collector
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the telemetry sink
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> ResilienceOrchestrator {
        ResilienceOrchestrator {
            breaker: self.breaker,
            retry_config: self.retry_config,
            retry_hook: self.retry_hook,
            metrics: self.metrics,
            telemetry: self.telemetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{InMemoryMetricsCollector, InMemoryTelemetrySink};
    use crate::resilience::CircuitBreakerConfig;
    use std::time::Duration;

    fn quick_retry(max_retries: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(max_retries)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(1000))
            .with_jitter_factor(0.0)
    }

    fn breaker(failure_threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new("model-inference")
                .failure_threshold(failure_threshold)
                .open_duration(Duration::from_secs(30)),
        ))
    }

    fn server_error() -> ReliabilityError {
        ReliabilityError::Server {
            message: "overloaded".to_string(),
            status_code: 503,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_outcome_per_call_despite_retries() {
        let cb = breaker(5);
        let orchestrator = ResilienceOrchestrator::new(cb.clone(), quick_retry(2));
        let calls = AtomicU32::new(0);

        let result = orchestrator
            .execute("complete", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(server_error())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = cb.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_rejects_without_attempting() {
        let cb = breaker(1);
        cb.force_open();
        let orchestrator = ResilienceOrchestrator::new(cb.clone(), quick_retry(3));
        let calls = AtomicU32::new(0);

        let result: ReliabilityResult<()> = orchestrator
            .execute("complete", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        match result {
            Err(ReliabilityError::CircuitOpen { name, stats }) => {
                assert_eq!(name, "model-inference");
                assert_eq!(stats.state, CircuitState::Open);
            }
            other => panic!("expected circuit open, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().total_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_call_updates_state_gauge() {
        let cb = breaker(1);
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let orchestrator = ResilienceOrchestrator::builder(cb.clone())
            .retry_config(quick_retry(0))
            .metrics(metrics.clone())
            .build();
        let _: ReliabilityResult<()> = orchestrator.execute("complete", || async { Ok(()) }).await;
        assert_eq!(
            metrics.get_gauge("reliability_breaker_state:breaker=model-inference"),
            Some(0.0)
        );

        cb.force_open();
        let _: ReliabilityResult<()> = orchestrator.execute("complete", || async { Ok(()) }).await;

        assert_eq!(metrics.get_counter("reliability_rejections_total:breaker=model-inference"), 1);
        assert_eq!(
            metrics.get_gauge("reliability_breaker_state:breaker=model-inference"),
            Some(1.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_final_error_counts_as_failure() {
        let cb = breaker(5);

        let result: ReliabilityResult<()> = execute_with_reliability(&cb, &quick_retry(3), || async {
            Err(ReliabilityError::Client {
                message: "invalid model".to_string(),
                status_code: 400,
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(cb.stats().total_failures, 1);
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_overrides_retry_policy() {
        let orchestrator = ResilienceOrchestrator::new(breaker(5), quick_retry(0));
        let calls = AtomicU32::new(0);

        let _: ReliabilityResult<()> = orchestrator
            .execute_with("complete", &quick_retry(4), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_call_releases_slot() {
        let cb = breaker(1);
        cb.force_half_open();
        let orchestrator = ResilienceOrchestrator::new(cb.clone(), quick_retry(3));

        let pending = orchestrator.execute("complete", || async { Err::<(), _>(server_error()) });
        // Polled up to the first backoff sleep, then dropped.
        let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_and_telemetry() {
        let cb = breaker(1);
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let sink = Arc::new(InMemoryTelemetrySink::new());
        let orchestrator = ResilienceOrchestrator::builder(cb.clone())
            .retry_config(quick_retry(1))
            .metrics(metrics.clone())
            .telemetry(sink.clone())
            .build();

        let context = CallContext::new().with_model("llama-3.1-8b");
        let usage = context.clone();
        let _: ReliabilityResult<()> = orchestrator
            .execute_with_context("complete", &context, || {
                usage.record_usage(10, 2);
                async { Err(server_error()) }
            })
            .await;
        let _: ReliabilityResult<()> = orchestrator
            .execute_with_context("complete", &context, || async { Ok(()) })
            .await;
        // No context, no record.
        let _: ReliabilityResult<()> = orchestrator.execute("complete", || async { Ok(()) }).await;

        assert_eq!(
            metrics.get_counter("reliability_calls_total:breaker=model-inference,status=error"),
            1
        );
        assert_eq!(metrics.get_counter("reliability_retries_total:breaker=model-inference"), 1);
        assert_eq!(metrics.get_counter("reliability_rejections_total:breaker=model-inference"), 2);
        assert_eq!(
            metrics.get_gauge("reliability_breaker_state:breaker=model-inference"),
            Some(1.0)
        );

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attempts, 2);
        assert!(records[0].latency_ms >= 100);
        assert_eq!(records[0].input_tokens, Some(10));
        assert_eq!(records[0].error_type.as_deref(), Some("server"));
        assert_eq!(records[1].attempts, 0);
        assert_eq!(records[1].error_type.as_deref(), Some("circuit_open"));
    }
}
