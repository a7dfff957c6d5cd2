//! # Adaptive Backpressure (C8)
//!
//! Smooths queue-fill ratio and processing latency into a single load
//! figure and adapts batch size / flush interval multiplicatively against
//! configured thresholds. The blend formula (`load = w * fill_ratio + (1-w)
//! * latency_norm`) follows the original `adaptive_monitor.cpp`'s EMA
//! approach, which the distilled spec named without pinning down the exact
//! blend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current adaptive state, clamped to the configured min/max bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackpressureState {
    pub current_batch_size: usize,
    pub current_flush_interval: Duration,
    pub smoothed_load: f64,
}

/// Tunables for the adaptive controller.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveBackpressureConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub min_flush_interval: Duration,
    pub max_flush_interval: Duration,
    pub low_threshold: f64,
    pub high_threshold: f64,
    /// Multiplicative step applied to batch size / flush interval per adaptation.
    pub adaptation_rate: f64,
    /// EMA smoothing factor for `smoothed_load`, in `(0, 1]`.
    pub smoothing_factor: f64,
    /// Blend weight `w` for fill ratio vs. latency norm (default `0.5`).
    pub latency_weight: f64,
    /// Latency above this is treated as saturating (norm = 1.0).
    pub latency_budget: Duration,
}

impl Default for AdaptiveBackpressureConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 1,
            max_batch_size: 1024,
            min_flush_interval: Duration::from_millis(10),
            max_flush_interval: Duration::from_millis(1000),
            low_threshold: 0.3,
            high_threshold: 0.7,
            adaptation_rate: 1.25,
            smoothing_factor: 0.3,
            latency_weight: 0.5,
            latency_budget: Duration::from_millis(100),
        }
    }
}

/// The adaptive backpressure controller for a single queue/pipeline.
#[derive(Debug)]
pub struct AdaptiveBackpressure {
    config: AdaptiveBackpressureConfig,
    state: Mutex<BackpressureState>,
    adaptations: AtomicU64,
}

impl AdaptiveBackpressure {
    pub fn new(config: AdaptiveBackpressureConfig) -> Self {
        let initial = BackpressureState {
            current_batch_size: config.min_batch_size,
            current_flush_interval: config.max_flush_interval,
            smoothed_load: 0.0,
        };
        Self {
            config,
            state: Mutex::new(initial),
            adaptations: AtomicU64::new(0),
        }
    }

    fn latency_norm(&self, latency: Duration) -> f64 {
        let budget = self.config.latency_budget.as_secs_f64().max(f64::EPSILON);
        (latency.as_secs_f64() / budget).clamp(0.0, 1.0)
    }

    /// Blend the new sample into the smoothed load and re-adapt.
    pub fn update(&self, fill_ratio: f64, recent_latency: Duration) -> BackpressureState {
        let fill_ratio = fill_ratio.clamp(0.0, 1.0);
        let latency_norm = self.latency_norm(recent_latency);
        let w = self.config.latency_weight;
        let instantaneous_load = w * fill_ratio + (1.0 - w) * latency_norm;

        let mut guard = self.state.lock().unwrap();
        let alpha = self.config.smoothing_factor;
        guard.smoothed_load = alpha * instantaneous_load + (1.0 - alpha) * guard.smoothed_load;
        self.apply_thresholds(&mut guard);
        *guard
    }

    /// Re-evaluate thresholds against the current smoothed load without a
    /// new sample, e.g. after config is hot-swapped.
    pub fn adapt(&self) -> BackpressureState {
        let mut guard = self.state.lock().unwrap();
        self.apply_thresholds(&mut guard);
        *guard
    }

    fn apply_thresholds(&self, state: &mut BackpressureState) {
        if state.smoothed_load > self.config.high_threshold {
            let grown = (state.current_batch_size as f64 * self.config.adaptation_rate).ceil() as usize;
            state.current_batch_size = grown.min(self.config.max_batch_size);
            let shrunk = state.current_flush_interval.div_f64(self.config.adaptation_rate);
            state.current_flush_interval = shrunk.max(self.config.min_flush_interval);
            self.adaptations.fetch_add(1, Ordering::Relaxed);
        } else if state.smoothed_load < self.config.low_threshold {
            let shrunk = (state.current_batch_size as f64 / self.config.adaptation_rate).floor() as usize;
            state.current_batch_size = shrunk.max(self.config.min_batch_size);
            let grown = state.current_flush_interval.mul_f64(self.config.adaptation_rate);
            state.current_flush_interval = grown.min(self.config.max_flush_interval);
            self.adaptations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn state(&self) -> BackpressureState {
        *self.state.lock().unwrap()
    }

    pub fn adaptation_count(&self) -> u64 {
        self.adaptations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdaptiveBackpressureConfig {
        AdaptiveBackpressureConfig {
            min_batch_size: 1,
            max_batch_size: 100,
            min_flush_interval: Duration::from_millis(10),
            max_flush_interval: Duration::from_millis(500),
            low_threshold: 0.3,
            high_threshold: 0.7,
            adaptation_rate: 2.0,
            smoothing_factor: 1.0,
            latency_weight: 0.5,
            latency_budget: Duration::from_millis(100),
        }
    }

    #[test]
    fn high_load_increases_batch_and_decreases_flush_interval() {
        let bp = AdaptiveBackpressure::new(config());
        let state = bp.update(0.9, Duration::from_millis(90));
        assert!(state.smoothed_load > 0.7);
        assert!(state.current_batch_size > 1);
        assert!(state.current_flush_interval < Duration::from_millis(500));
        assert_eq!(bp.adaptation_count(), 1);
    }

    #[test]
    fn low_load_decreases_batch_and_increases_flush_interval() {
        let bp = AdaptiveBackpressure::new(config());
        bp.update(0.9, Duration::from_millis(90));
        let before = bp.state();
        let after = bp.update(0.05, Duration::from_millis(1));
        assert!(after.current_batch_size <= before.current_batch_size);
        assert!(after.current_flush_interval >= before.current_flush_interval);
    }

    #[test]
    fn values_stay_within_configured_bounds() {
        let bp = AdaptiveBackpressure::new(config());
        for _ in 0..20 {
            bp.update(1.0, Duration::from_millis(1000));
        }
        let state = bp.state();
        assert!(state.current_batch_size <= 100);
        assert!(state.current_flush_interval >= Duration::from_millis(10));
    }

    #[test]
    fn adapt_forces_recomputation_without_new_sample() {
        let bp = AdaptiveBackpressure::new(config());
        bp.update(0.9, Duration::from_millis(90));
        let count_before = bp.adaptation_count();
        let state = bp.adapt();
        assert!(state.smoothed_load > 0.7);
        assert_eq!(bp.adaptation_count(), count_before + 1);
    }
}
