//! Circuit breaker state machine.

use crate::errors::{ReliabilityError, ReliabilityResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Name of the protected dependency; also the registry key
    pub name: String,
    /// Consecutive failures in `Closed` before the circuit opens
    pub failure_threshold: u32,
    /// Probe successes in `HalfOpen` before the circuit closes
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a probe
    pub open_duration: Duration,
    /// Age after which an unreported probe is considered abandoned.
    /// `None` means `open_duration`.
    pub probe_timeout: Option<Duration>,
}

impl CircuitBreakerConfig {
    /// Creates a configuration with default thresholds for the named dependency.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            success_threshold: 1,
            open_duration: Duration::from_secs(30),
            probe_timeout: None,
        }
    }

    /// Sets the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the success threshold.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Sets the open duration.
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Sets the probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Effective age limit for a claimed probe.
    pub fn effective_probe_timeout(&self) -> Duration {
        self.probe_timeout.unwrap_or(self.open_duration)
    }

    /// Checks the configuration invariants.
    pub fn validate(&self) -> ReliabilityResult<()> {
        let problem = if self.name.trim().is_empty() {
            Some("circuit breaker name must not be empty".to_string())
        } else if self.failure_threshold == 0 {
            Some(format!("{}: failure_threshold must be greater than zero", self.name))
        } else if self.success_threshold == 0 {
            Some(format!("{}: success_threshold must be greater than zero", self.name))
        } else if self.open_duration.is_zero() {
            Some(format!("{}: open_duration must be greater than zero", self.name))
        } else if self.probe_timeout.is_some_and(|t| t.is_zero()) {
            Some(format!("{}: probe_timeout must be greater than zero", self.name))
        } else {
            None
        };

        match problem {
            Some(message) => Err(ReliabilityError::Configuration { message }),
            None => Ok(()),
        }
    }
}

/// Circuit breaker state
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected without being attempted
    Open,
    /// Circuit is half-open, one probe at a time tests recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of a breaker, safe to hand to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failure streak counted in `Closed`
    pub failures: u32,
    /// Probe successes counted in `HalfOpen`
    pub successes: u32,
    /// When the last failure was recorded
    pub last_failure_time: Option<DateTime<Utc>>,
    /// When the breaker last changed state
    pub last_state_change: DateTime<Utc>,
    /// Outcomes recorded since creation or the last reset
    pub total_requests: u64,
    /// Failures recorded since creation or the last reset
    pub total_failures: u64,
}

/// Hook for circuit breaker state changes
pub trait CircuitBreakerHook: Send + Sync {
    /// Called after the lock is released, once per transition.
    fn on_state_change(&self, breaker: &str, old_state: CircuitState, new_state: CircuitState);
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
    state_changed_at: Instant,
    total_requests: u64,
    total_failures: u64,
    probe_claimed_at: Option<Instant>,
}

impl BreakerState {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure_time: None,
            last_state_change: Utc::now(),
            state_changed_at: Instant::now(),
            total_requests: 0,
            total_failures: 0,
            probe_claimed_at: None,
        }
    }

    /// Moves to `new_state`, applying the entry rules. Returns the transition if the state changed.
    fn enter(&mut self, new_state: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let old_state = self.state;
        self.state = new_state;
        self.state_changed_at = Instant::now();
        self.last_state_change = Utc::now();

        match new_state {
            CircuitState::Closed => {
                self.failures = 0;
                self.successes = 0;
            }
            CircuitState::HalfOpen => self.successes = 0,
            CircuitState::Open => self.probe_claimed_at = None,
        }

        (old_state != new_state).then_some((old_state, new_state))
    }
}

type Transition = Option<(CircuitState, CircuitState)>;

/// Result of asking the breaker for permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Permit {
    Denied,
    Granted,
    /// Granted, and the caller now holds the half-open probe slot.
    Probe,
}

/// Per-dependency circuit breaker.
///
/// All counters and the probe slot live behind one mutex, so every public
/// operation is an atomic read-modify-write. Nothing here awaits.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    hook: Option<Arc<dyn CircuitBreakerHook>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::fresh()),
            hook: None,
        }
    }

    /// Like [`CircuitBreaker::new`], but validates the configuration first.
    pub fn try_new(config: CircuitBreakerConfig) -> ReliabilityResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Add a hook for circuit breaker state changes
    pub fn with_hook(mut self, hook: Arc<dyn CircuitBreakerHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Decides whether the caller may attempt the guarded operation now.
    ///
    /// Call this immediately before each attempt. In `Open` and `HalfOpen`
    /// a `true` answer claims the single probe slot, which stays claimed
    /// until [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or
    /// [`release_probe`](Self::release_probe) is called, or until it is older
    /// than the probe timeout.
    pub fn can_execute(&self) -> bool {
        self.try_acquire() != Permit::Denied
    }

    pub(crate) fn try_acquire(&self) -> Permit {
        let (permit, transition) = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            match inner.state {
                CircuitState::Closed => (Permit::Granted, None),
                CircuitState::Open => {
                    if now.duration_since(inner.state_changed_at) >= self.config.open_duration {
                        let transition = inner.enter(CircuitState::HalfOpen);
                        inner.probe_claimed_at = Some(now);
                        (Permit::Probe, transition)
                    } else {
                        (Permit::Denied, None)
                    }
                }
                CircuitState::HalfOpen => match inner.probe_claimed_at {
                    None => {
                        inner.probe_claimed_at = Some(now);
                        (Permit::Probe, None)
                    }
                    Some(claimed_at)
                        if now.duration_since(claimed_at)
                            >= self.config.effective_probe_timeout() =>
                    {
                        tracing::warn!(
                            breaker = %self.config.name,
                            "Abandoned half-open probe reclaimed"
                        );
                        inner.probe_claimed_at = Some(now);
                        (Permit::Probe, None)
                    }
                    Some(_) => (Permit::Denied, None),
                },
            }
        };

        self.announce(transition);
        permit
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.total_requests += 1;
            inner.probe_claimed_at = None;

            match inner.state {
                CircuitState::HalfOpen => {
                    inner.successes += 1;
                    if inner.successes >= self.config.success_threshold {
                        inner.enter(CircuitState::Closed)
                    } else {
                        None
                    }
                }
                CircuitState::Closed => {
                    inner.failures = 0;
                    None
                }
                CircuitState::Open => None,
            }
        };

        self.announce(transition);
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.total_requests += 1;
            inner.total_failures += 1;
            inner.failures = inner.failures.saturating_add(1);
            inner.last_failure_time = Some(Utc::now());
            inner.probe_claimed_at = None;

            match inner.state {
                CircuitState::HalfOpen => inner.enter(CircuitState::Open),
                CircuitState::Closed if inner.failures >= self.config.failure_threshold => {
                    inner.enter(CircuitState::Open)
                }
                _ => None,
            }
        };

        self.announce(transition);
    }

    /// Frees a claimed probe slot without reporting an outcome.
    ///
    /// Used when a call is abandoned between `can_execute()` and its outcome.
    pub fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.probe_claimed_at.take().is_some() {
            tracing::debug!(breaker = %self.config.name, "Probe slot released");
        }
    }

    /// Returns to a fresh `Closed` breaker, clearing cumulative totals.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let old_state = inner.state;
            *inner = BreakerState::fresh();
            (old_state != CircuitState::Closed).then_some((old_state, CircuitState::Closed))
        };

        tracing::info!(breaker = %self.config.name, "Circuit breaker reset");
        self.announce(transition);
    }

    /// Forces the circuit open, restarting the open duration.
    pub fn force_open(&self) {
        self.force(CircuitState::Open);
    }

    /// Forces the circuit half-open with a free probe slot.
    pub fn force_half_open(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.probe_claimed_at = None;
            inner.enter(CircuitState::HalfOpen)
        };
        self.announce(transition);
    }

    /// Forces the circuit closed, clearing the failure streak.
    pub fn force_closed(&self) {
        self.force(CircuitState::Closed);
    }

    fn force(&self, state: CircuitState) {
        let transition = self.inner.lock().enter(state);
        self.announce(transition);
    }

    /// Snapshot of the breaker; never mutates it.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            last_failure_time: inner.last_failure_time,
            last_state_change: inner.last_state_change,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
        }
    }

    /// Get the time until the circuit allows a probe; `None` unless open.
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }

        let elapsed = inner.state_changed_at.elapsed();
        Some(self.config.open_duration.saturating_sub(elapsed))
    }

    fn announce(&self, transition: Transition) {
        let Some((old_state, new_state)) = transition else {
            return;
        };

        match new_state {
            CircuitState::Open => tracing::warn!(
                breaker = %self.config.name,
                from = %old_state,
                open_for_ms = self.config.open_duration.as_millis() as u64,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %self.config.name,
                from = %old_state,
                "Circuit breaker half-open, probing"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %self.config.name,
                from = %old_state,
                "Circuit breaker closed"
            ),
        }

        if let Some(hook) = &self.hook {
            hook.on_state_change(&self.config.name, old_state, new_state);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}
