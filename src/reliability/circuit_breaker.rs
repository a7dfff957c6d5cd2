//! Circuit breaker (spec §4.7, §8 scenario 3).
//!
//! State machine `Closed -> Open -> HalfOpen -> Closed`, independent per key.
//! Grounded on the teacher's `CircuitBreakerBehavior`/`CircuitBreakerMetrics`
//! shape, adapted from a per-component singleton to a per-key registry since
//! this fabric needs one breaker instance per handler/endpoint name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskmeshError};

/// The three states a breaker can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Tunables for a single breaker instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Observability snapshot for a breaker, mirroring the teacher's
/// `CircuitBreakerMetrics` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub current_state: CircuitState,
}

impl CircuitBreakerMetrics {
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.total_calls as f64
        }
    }
}

struct TransitionState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_transition: Instant,
}

/// Object-safe capability set, mirroring the teacher's `CircuitBreakerBehavior`
/// trait: consumers that need uniform access to any breaker (health reporting)
/// can hold `&dyn CircuitBreakerBehavior`, while hot paths use the concrete
/// `CircuitBreaker` for zero-cost dispatch.
pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;
    fn should_allow(&self) -> bool;
    fn record_success(&self);
    fn record_failure(&self);
    fn is_healthy(&self) -> bool;
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitBreakerMetrics;
}

/// A single named circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    transition: Mutex<TransitionState>,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            transition: Mutex::new(TransitionState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_transition: Instant::now(),
            }),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    /// Run `f` through the breaker: short-circuits with `CircuitOpen` in the
    /// `Open` state without ever calling `f`. The closure's own error is
    /// propagated unchanged on failure, so this composes transparently with
    /// [`super::retry::RetryExecutor`] and the handler-invocation boundary.
    pub fn call<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if !self.should_allow() {
            return Err(TaskmeshError::CircuitOpen(self.name.clone()));
        }
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        match f() {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        self.transition.lock().unwrap().state
    }

    fn should_allow(&self) -> bool {
        let mut guard = self.transition.lock().unwrap();
        match guard.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if guard.last_transition.elapsed() >= self.config.reset_timeout {
                    guard.state = CircuitState::HalfOpen;
                    guard.consecutive_successes = 0;
                    guard.last_transition = Instant::now();
                    tracing::info!(breaker = %self.name, "circuit breaker transitioning to half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.transition.lock().unwrap();
        guard.consecutive_failures = 0;
        match guard.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                guard.consecutive_successes += 1;
                if guard.consecutive_successes >= self.config.success_threshold {
                    guard.state = CircuitState::Closed;
                    guard.last_transition = Instant::now();
                    tracing::info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.transition.lock().unwrap();
        match guard.state {
            CircuitState::Closed => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.config.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.last_transition = Instant::now();
                    tracing::warn!(breaker = %self.name, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.consecutive_successes = 0;
                guard.last_transition = Instant::now();
                tracing::warn!(breaker = %self.name, "circuit breaker re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    fn is_healthy(&self) -> bool {
        !matches!(self.state(), CircuitState::Open)
    }

    fn force_open(&self) {
        let mut guard = self.transition.lock().unwrap();
        guard.state = CircuitState::Open;
        guard.last_transition = Instant::now();
    }

    fn force_closed(&self) {
        let mut guard = self.transition.lock().unwrap();
        guard.state = CircuitState::Closed;
        guard.consecutive_failures = 0;
        guard.consecutive_successes = 0;
        guard.last_transition = Instant::now();
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let guard = self.transition.lock().unwrap();
        CircuitBreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            consecutive_failures: guard.consecutive_failures as u64,
            current_state: guard.state,
        }
    }
}
