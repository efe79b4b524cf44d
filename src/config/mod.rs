//! Configuration for the reliability layer.

use crate::errors::{ReliabilityError, ReliabilityResult};
use crate::observability::LogLevel;
use crate::resilience::{BreakerRegistry, CircuitBreakerConfig, RetryConfig};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding `RetryConfig::max_retries`.
pub const ENV_MAX_RETRIES: &str = "RELIABILITY_MAX_RETRIES";
/// Environment variable overriding `RetryConfig::base_delay`, in milliseconds.
pub const ENV_BASE_DELAY_MS: &str = "RELIABILITY_BASE_DELAY_MS";
/// Environment variable overriding `RetryConfig::max_delay`, in milliseconds.
pub const ENV_MAX_DELAY_MS: &str = "RELIABILITY_MAX_DELAY_MS";
/// Environment variable overriding `RetryConfig::jitter_factor`.
pub const ENV_JITTER_FACTOR: &str = "RELIABILITY_JITTER_FACTOR";
/// Environment variable selecting the log level.
pub const ENV_LOG_LEVEL: &str = "RELIABILITY_LOG_LEVEL";

/// Retry policy and breaker presets for a service.
#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    /// Default retry policy
    pub retry: RetryConfig,
    /// Breaker guarding the model inference API
    pub model_inference: CircuitBreakerConfig,
    /// Breaker guarding the wearable cloud API
    pub wearable_cloud: CircuitBreakerConfig,
    /// Log level for `LoggingConfig`
    pub log_level: LogLevel,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            model_inference: CircuitBreakerConfig::model_inference(),
            wearable_cloud: CircuitBreakerConfig::wearable_cloud(),
            log_level: LogLevel::Info,
        }
    }
}

impl ReliabilityConfig {
    /// Creates a new configuration builder
    pub fn builder() -> ReliabilityConfigBuilder {
        ReliabilityConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> ReliabilityResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> ReliabilityResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(max_retries) = parse_var::<u32, _>(&lookup, ENV_MAX_RETRIES)? {
            builder = builder.max_retries(max_retries);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_BASE_DELAY_MS)? {
            builder = builder.base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_MAX_DELAY_MS)? {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(jitter) = parse_var::<f64, _>(&lookup, ENV_JITTER_FACTOR)? {
            builder = builder.jitter_factor(jitter);
        }
        if let Some(level) = parse_var::<LogLevel, _>(&lookup, ENV_LOG_LEVEL)? {
            builder = builder.log_level(level);
        }

        builder.build()
    }

    /// Checks the retry policy and both breaker configurations.
    pub fn validate(&self) -> ReliabilityResult<()> {
        self.retry.validate()?;
        self.model_inference.validate()?;
        self.wearable_cloud.validate()
    }

    /// Builds a registry holding both configured breakers.
    pub fn build_registry(&self) -> BreakerRegistry {
        let registry = BreakerRegistry::new();
        for config in [&self.model_inference, &self.wearable_cloud] {
            registry.get_or_create(&config.name, config.clone());
        }
        registry
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> ReliabilityResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ReliabilityError::Configuration {
                message: format!("invalid {}={:?}: {}", key, raw, e),
            }),
    }
}

/// Builder for ReliabilityConfig
#[derive(Default)]
pub struct ReliabilityConfigBuilder {
    max_retries: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    jitter_factor: Option<f64>,
    model_inference: Option<CircuitBreakerConfig>,
    wearable_cloud: Option<CircuitBreakerConfig>,
    log_level: Option<LogLevel>,
}

impl ReliabilityConfigBuilder {
    /// Sets the maximum number of retries
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the base retry delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Sets the retry delay ceiling
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Sets the jitter factor
    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = Some(jitter_factor);
        self
    }

    /// Replaces the model inference breaker configuration
    pub fn model_inference(mut self, config: CircuitBreakerConfig) -> Self {
        self.model_inference = Some(config);
        self
    }

    /// Replaces the wearable cloud breaker configuration
    pub fn wearable_cloud(mut self, config: CircuitBreakerConfig) -> Self {
        self.wearable_cloud = Some(config);
        self
    }

    /// Sets the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Builds and validates the configuration
    pub fn build(self) -> ReliabilityResult<ReliabilityConfig> {
        let defaults = ReliabilityConfig::default();
        let mut retry = defaults.retry;
        if let Some(max_retries) = self.max_retries {
            retry = retry.with_max_retries(max_retries);
        }
        if let Some(delay) = self.base_delay {
            retry = retry.with_base_delay(delay);
        }
        if let Some(delay) = self.max_delay {
            retry = retry.with_max_delay(delay);
        }
        if let Some(jitter) = self.jitter_factor {
            retry = retry.with_jitter_factor(jitter);
        }

        let config = ReliabilityConfig {
            retry,
            model_inference: self.model_inference.unwrap_or(defaults.model_inference),
            wearable_cloud: self.wearable_cloud.unwrap_or(defaults.wearable_cloud),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }
}
