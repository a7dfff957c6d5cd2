//! Retry executor (spec §4.7, §8 scenario 4).
//!
//! Tagged-variant strategy instead of a strategy-object hierarchy, per the
//! REDESIGN FLAGS guidance for inheritance-based policies.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TaskmeshError};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    Fixed,
    Exponential,
    Fibonacci,
}

fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

impl RetryStrategy {
    /// Delay before the given 1-indexed attempt number, before jitter.
    fn base_delay(self, attempt: u32, base_delay: Duration, multiplier: f64) -> Duration {
        match self {
            RetryStrategy::Fixed => base_delay,
            RetryStrategy::Exponential => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                base_delay.mul_f64(factor.max(0.0))
            }
            RetryStrategy::Fibonacci => {
                let term = fibonacci(attempt.saturating_sub(1)).max(1);
                base_delay.saturating_mul(term as u32)
            }
        }
    }
}

/// Retry executor configuration.
#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub strategy: RetryStrategy,
    pub jitter: bool,
    /// Predicate deciding whether a given error is worth retrying.
    pub should_retry: Arc<dyn Fn(&TaskmeshError) -> bool + Send + Sync>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("strategy", &self.strategy)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            strategy: RetryStrategy::Exponential,
            jitter: false,
            should_retry: Arc::new(|_| true),
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self
            .strategy
            .base_delay(attempt, self.base_delay, self.multiplier);
        if !self.jitter {
            return base;
        }
        let jitter_span = base.mul_f64(0.1);
        let jitter_nanos = fastrand::u64(0..=jitter_span.as_nanos().min(u64::MAX as u128) as u64);
        let jitter = Duration::from_nanos(jitter_nanos);
        if fastrand::bool() {
            base + jitter
        } else {
            base.saturating_sub(jitter)
        }
    }
}

/// Runs `f` up to `config.max_attempts` times, sleeping between attempts per
/// the configured strategy, stopping early when `should_retry` rejects the
/// error.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn execute<T>(&self, mut f: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match f(attempt) {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.config.max_attempts || !(self.config.should_retry)(&err) {
                        return Err(err);
                    }
                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::debug!(attempt, ?delay, "retrying after failure");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
