//! Per-key circuit breaker registry (spec §4.7: "Breaker state is independent
//! per key").
//!
//! Grounded on the teacher's `dashmap`-backed subscription registries: a
//! concurrent map keyed by breaker name, created lazily on first use.

use std::sync::Arc;

use dashmap::DashMap;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Lazily-populated set of independent, named circuit breakers.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Get (or lazily create with the registry's default config) the breaker
    /// for `key`.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.default_config)))
            .clone()
    }

    /// Create (or replace) the breaker for `key` with an explicit config.
    pub fn configure(&self, key: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(key, config));
        self.breakers.insert(key.to_string(), breaker.clone());
        breaker
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::circuit_breaker::CircuitBreakerBehavior;

    #[test]
    fn breakers_are_independent_per_key() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");
        a.force_open();
        assert!(!a.is_healthy());
        assert!(b.is_healthy());
    }

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
        let a1 = registry.get_or_create("svc");
        let a2 = registry.get_or_create("svc");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(registry.len(), 1);
    }
}
