//! Integration tests for retry, circuit breaking and their composition.

use integrations_reliability::resilience::{
    calculate_backoff_with_rng, execute_with_reliability, BreakerRegistry, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, ResilienceOrchestrator, RetryConfig, RetryContext,
    RetryDecision, RetryExecutor, RetryHook,
};
use integrations_reliability::{ReliabilityError, ReliabilityResult};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn unavailable(attempt: u32) -> ReliabilityError {
    ReliabilityError::Server {
        message: format!("unavailable on attempt {}", attempt),
        status_code: 503,
    }
}

#[derive(Default)]
struct DelayLog {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait::async_trait]
impl RetryHook for DelayLog {
    async fn on_retry(&self, context: RetryContext) -> RetryDecision {
        self.delays.lock().push(context.delay);
        RetryDecision::Default
    }
}

#[test]
fn test_backoff_within_jitter_envelope() {
    // Arrange
    let base = Duration::from_millis(100);
    let max = Duration::from_millis(1000);
    let jitter = 0.5;
    let mut rng = StdRng::seed_from_u64(2024);

    for attempt in 0..8u32 {
        let capped = (100.0 * 2f64.powi(attempt as i32)).min(1000.0);

        for _ in 0..100 {
            // Act
            let delay = calculate_backoff_with_rng(attempt, base, max, jitter, &mut rng);

            // Assert
            let ms = delay.as_millis() as f64;
            assert!(ms >= (capped * (1.0 - jitter)).floor());
            assert!(ms <= (capped * (1.0 + jitter)).ceil());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_invokes_n_plus_one_times() {
    // Arrange
    let executor = RetryExecutor::new(
        RetryConfig::default()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(50)),
    );
    let attempts = AtomicU32::new(0);

    // Act
    let result: ReliabilityResult<()> = executor
        .execute("sync_sleep", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(unavailable(n)) }
        })
        .await;

    // Assert
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(
        result.unwrap_err().to_string(),
        "Server error (503): unavailable on attempt 3"
    );
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success_computes_two_delays() {
    // Arrange
    let log = Arc::new(DelayLog::default());
    let executor = RetryExecutor::new(
        RetryConfig::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(1000)),
    )
    .with_hook(log.clone());
    let attempts = AtomicU32::new(0);

    // Act
    let result = executor
        .execute("complete", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(unavailable(n))
                } else {
                    Ok("third time lucky")
                }
            }
        })
        .await;

    // Assert
    assert_eq!(result.unwrap(), "third time lucky");
    let delays = log.delays.lock();
    assert_eq!(delays.len(), 2);
    assert!(delays[0] >= Duration::from_millis(90) && delays[0] <= Duration::from_millis(110));
    assert!(delays[1] >= Duration::from_millis(180) && delays[1] <= Duration::from_millis(220));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_scenario_open_probe_close() {
    // Arrange
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::new("wearable-cloud")
            .failure_threshold(3)
            .success_threshold(1)
            .open_duration(Duration::from_millis(1000)),
    );
    let retry = RetryConfig::no_retry();

    // Act
    for _ in 0..3 {
        let _: ReliabilityResult<()> =
            execute_with_reliability(&breaker, &retry, || async { Err(unavailable(0)) }).await;
    }

    // Assert
    assert!(!breaker.can_execute());

    tokio::time::advance(Duration::from_millis(1000)).await;
    assert!(breaker.can_execute());
    assert!(!breaker.can_execute());

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_composer_reports_once_per_outer_call() {
    // Arrange
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new("model-inference").failure_threshold(2),
    ));
    let orchestrator = ResilienceOrchestrator::new(
        breaker.clone(),
        RetryConfig::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(10)),
    );
    let attempts = AtomicU32::new(0);

    // Act
    let result: ReliabilityResult<()> = orchestrator
        .execute("complete", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(unavailable(n)) }
        })
        .await;

    // Assert
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let stats = breaker.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_circuit_open_is_distinguishable() {
    // Arrange
    let registry = BreakerRegistry::with_presets();
    let breaker = registry
        .get("model-inference")
        .expect("preset registered");
    breaker.force_open();
    let orchestrator = ResilienceOrchestrator::new(breaker, RetryConfig::default());

    // Act
    let result: ReliabilityResult<()> = orchestrator.execute("complete", || async { Ok(()) }).await;

    // Assert
    match result {
        Err(ReliabilityError::CircuitOpen { name, stats }) => {
            assert_eq!(name, "model-inference");
            assert_eq!(stats.state, CircuitState::Open);
            assert_eq!(stats.total_requests, 0);
        }
        other => panic!("expected CircuitOpen, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_registry_shares_breakers_across_call_sites() {
    // Arrange
    let registry = Arc::new(BreakerRegistry::new());
    let config = CircuitBreakerConfig::new("geofence").failure_threshold(2);

    // Act
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            let config = config.clone();
            tokio::spawn(async move {
                let breaker = registry.get_or_create("geofence", config);
                let _: ReliabilityResult<()> = execute_with_reliability(
                    &breaker,
                    &RetryConfig::no_retry(),
                    || async { Err(unavailable(0)) },
                )
                .await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Assert
    assert_eq!(registry.len(), 1);
    let stats = registry.list_all();
    assert_eq!(stats[0].state, CircuitState::Open);
    assert_eq!(stats[0].total_failures, 2);
}
