//! Scenario tests across breaker, retry and orchestrator.

use super::*;
use crate::errors::{ReliabilityError, ReliabilityResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn network_error() -> ReliabilityError {
    ReliabilityError::Network {
        message: "connection reset by peer".to_string(),
    }
}

fn no_retry() -> RetryConfig {
    RetryConfig::no_retry()
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_open_then_probe_closes() {
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new("wearable-cloud")
            .failure_threshold(3)
            .success_threshold(1)
            .open_duration(Duration::from_millis(1000)),
    ));
    let orchestrator = ResilienceOrchestrator::new(breaker.clone(), no_retry());

    for _ in 0..3 {
        let result: ReliabilityResult<()> = orchestrator
            .execute("sync", || async { Err(network_error()) })
            .await;
        assert!(matches!(result, Err(ReliabilityError::Network { .. })));
    }
    assert!(!breaker.can_execute());

    tokio::time::advance(Duration::from_millis(1000)).await;

    let result = orchestrator.execute("sync", || async { Ok(7) }).await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.stats().failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_reopens_and_restarts_cooldown() {
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new("model-inference")
            .failure_threshold(1)
            .success_threshold(2)
            .open_duration(Duration::from_secs(30)),
    ));
    let orchestrator = ResilienceOrchestrator::new(breaker.clone(), no_retry());

    let _: ReliabilityResult<()> = orchestrator.execute("complete", || async { Err(network_error()) }).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    let _: ReliabilityResult<()> = orchestrator.execute("complete", || async { Err(network_error()) }).await;

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.time_until_half_open(), Some(Duration::from_secs(30)));

    let rejected: ReliabilityResult<()> = orchestrator.execute("complete", || async { Ok(()) }).await;
    assert!(rejected.unwrap_err().is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_probe() {
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new("model-inference").failure_threshold(1),
    ));
    breaker.force_half_open();
    let orchestrator = ResilienceOrchestrator::new(breaker.clone(), no_retry());
    let attempts = Arc::new(AtomicU32::new(0));

    let calls = (0..8).map(|_| {
        let orchestrator = orchestrator.clone();
        let attempts = attempts.clone();
        async move {
            orchestrator
                .execute("complete", || {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    }
                })
                .await
        }
    });
    let results = futures::future::join_all(calls).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_circuit_open()))
            .count(),
        7
    );
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_retries_within_call_do_not_trip_breaker() {
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new("model-inference").failure_threshold(2),
    ));
    let retry = RetryConfig::default()
        .with_max_retries(5)
        .with_base_delay(Duration::from_millis(10));
    let orchestrator = ResilienceOrchestrator::new(breaker.clone(), retry);
    let attempts = AtomicU32::new(0);

    let result = orchestrator
        .execute("complete", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 4 {
                    Err(network_error())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 4);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.stats().total_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_registry_breaker_shared_by_orchestrators() {
    let registry = BreakerRegistry::with_presets();
    let sync = ResilienceOrchestrator::new(
        registry.get_or_create(
            presets::WEARABLE_CLOUD,
            CircuitBreakerConfig::wearable_cloud(),
        ),
        no_retry(),
    );
    let upload = ResilienceOrchestrator::new(
        registry.get_or_create(
            presets::WEARABLE_CLOUD,
            CircuitBreakerConfig::new("ignored").failure_threshold(100),
        ),
        no_retry(),
    );

    for _ in 0..3 {
        let _: ReliabilityResult<()> = sync.execute("sync", || async { Err(network_error()) }).await;
    }

    let rejected: ReliabilityResult<()> = upload.execute("upload", || async { Ok(()) }).await;
    assert!(rejected.unwrap_err().is_circuit_open());
    let stats = registry.list_all();
    assert_eq!(stats[1].name, "wearable-cloud");
    assert_eq!(stats[1].state, CircuitState::Open);
}
