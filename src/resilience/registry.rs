//! Named circuit breaker store.

use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
use crate::resilience::presets;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

static GLOBAL: Lazy<BreakerRegistry> = Lazy::new(BreakerRegistry::with_presets);

/// Map from dependency name to its shared breaker.
///
/// Entries are created on first lookup and never evicted. The first
/// configuration registered under a name is the one that sticks.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in presets.
    pub fn with_presets() -> Self {
        let registry = Self::new();
        for config in presets::all() {
            let name = config.name.clone();
            registry.get_or_create(&name, config);
        }
        registry
    }

    /// Process-wide registry, initialized with the presets on first use.
    ///
    /// This is the single pre-seeded shared instance. Components should take
    /// a `&BreakerRegistry` (or an `Arc` of one) as a parameter rather than
    /// reaching for this directly, so tests and embedders can supply their
    /// own store from [`BreakerRegistry::new`] or
    /// [`ReliabilityConfig::build_registry`](crate::config::ReliabilityConfig::build_registry).
    pub fn global() -> &'static BreakerRegistry {
        &GLOBAL
    }

    /// Returns the breaker registered under `name`, creating it from `config`
    /// if absent. `config.name` is replaced by `name`.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                    name: name.to_string(),
                    ..config
                }))
            })
            .clone()
    }

    /// Registers a pre-built breaker (for example one carrying a hook).
    ///
    /// If the name is taken, the existing breaker is returned and `breaker`
    /// is discarded.
    pub fn register(&self, breaker: CircuitBreaker) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.write();
        breakers
            .entry(breaker.name().to_string())
            .or_insert_with(|| Arc::new(breaker))
            .clone()
    }

    /// Looks up a breaker without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }

    /// Stats of every breaker, sorted by name.
    pub fn list_all(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<CircuitBreakerStats> =
            self.snapshot().iter().map(|breaker| breaker.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Resets every breaker to a fresh closed state.
    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        for breaker in &breakers {
            breaker.reset();
        }
        tracing::info!(count = breakers.len(), "All circuit breakers reset");
    }

    /// Health summary for status endpoints.
    ///
    /// `healthy` is false while any breaker is open.
    pub fn health_report(&self) -> serde_json::Value {
        let stats = self.list_all();
        let open: Vec<&str> = stats
            .iter()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.name.as_str())
            .collect();

        serde_json::json!({
            "healthy": open.is_empty(),
            "open": open,
            "breakers": stats,
        })
    }

    // Breaker calls may run hooks; never hold the map lock across them.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.read().values().cloned().collect()
    }
}
