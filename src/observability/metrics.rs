//! Metrics collection for guarded calls.
//!
//! Counters, histograms and gauges with label support. The orchestrator
//! reports into any [`MetricsCollector`]; the in-memory collector backs tests
//! and simple deployments.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for reliability metrics.
pub trait MetricsCollector: Send + Sync {
    /// Increments a counter by `value`.
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    /// Records one observation in a histogram.
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Sets a gauge to `value`.
    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// In-memory metrics collector.
///
/// Series are keyed as `name` or `name:k1=v1,k2=v2` in label order.
///
/// ```
/// use integrations_reliability::observability::{InMemoryMetricsCollector, MetricsCollector};
///
/// let collector = InMemoryMetricsCollector::new();
/// collector.increment_counter("reliability_calls_total", 1, &[("breaker", "wearable-cloud")]);
/// assert_eq!(collector.get_counter("reliability_calls_total:breaker=wearable-cloud"), 1);
/// ```
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    counters: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, Vec<f64>>>,
    gauges: RwLock<HashMap<String, f64>>,
}

impl InMemoryMetricsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, 0 if it was never incremented.
    pub fn get_counter(&self, key: &str) -> u64 {
        self.counters
            .read()
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Every observation recorded for a histogram series.
    pub fn get_histogram(&self, key: &str) -> Vec<f64> {
        self.histograms.read().get(key).cloned().unwrap_or_default()
    }

    /// Current value of a gauge.
    pub fn get_gauge(&self, key: &str) -> Option<f64> {
        self.gauges.read().get(key).copied()
    }

    /// Drops every series.
    pub fn reset(&self) {
        self.counters.write().clear();
        self.histograms.write().clear();
        self.gauges.write().clear();
    }

    fn make_key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let labels: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}:{}", name, labels.join(","))
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        if let Some(counter) = self.counters.read().get(&key) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        self.histograms.write().entry(key).or_default().push(value);
    }

    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        self.gauges.write().insert(key, value);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn increment_counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}
    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Metric names emitted by the orchestrator.
pub mod metric_names {
    /// Guarded calls that reached the dependency, labelled by breaker and outcome
    pub const CALLS_TOTAL: &str = "reliability_calls_total";

    /// Retries performed inside guarded calls
    pub const RETRIES_TOTAL: &str = "reliability_retries_total";

    /// Calls rejected by an open circuit
    pub const REJECTIONS_TOTAL: &str = "reliability_rejections_total";

    /// Wall time of a guarded call including backoff, in milliseconds
    pub const CALL_DURATION_MS: &str = "reliability_call_duration_ms";

    /// Breaker state after the call (0=closed, 1=open, 2=half-open)
    pub const BREAKER_STATE: &str = "reliability_breaker_state";
}
