//! Named breaker configurations for the dependencies this layer protects.

use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use std::time::Duration;

/// Registry name of the model inference breaker.
pub const MODEL_INFERENCE: &str = "model-inference";

/// Registry name of the wearable device cloud breaker.
pub const WEARABLE_CLOUD: &str = "wearable-cloud";

impl CircuitBreakerConfig {
    /// Model inference API: tolerant of bursts, recovers after two good probes.
    pub fn model_inference() -> Self {
        Self::new(MODEL_INFERENCE)
            .failure_threshold(5)
            .success_threshold(2)
            .open_duration(Duration::from_millis(30_000))
    }

    /// Wearable cloud API: trips early and stays open longer.
    pub fn wearable_cloud() -> Self {
        Self::new(WEARABLE_CLOUD)
            .failure_threshold(3)
            .success_threshold(1)
            .open_duration(Duration::from_millis(60_000))
    }
}

/// Every built-in preset.
pub fn all() -> Vec<CircuitBreakerConfig> {
    vec![
        CircuitBreakerConfig::model_inference(),
        CircuitBreakerConfig::wearable_cloud(),
    ]
}
