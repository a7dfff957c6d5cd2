//! Fault-tolerance composition (spec §4.7): layers a circuit breaker, a
//! retry executor, and an optional timeout around a single call, with the
//! breaker/retry nesting order controlled by `breaker_first`.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TaskmeshError};
use crate::reliability::circuit_breaker::CircuitBreaker;
use crate::reliability::retry::RetryExecutor;

/// Composition toggles. When `breaker_first` is true, the breaker wraps the
/// retry executor so one logical call (including every retry attempt) counts
/// as a single breaker observation. When false, each individual attempt
/// consults the breaker on its own.
#[derive(Debug, Clone, Copy)]
pub struct FaultToleranceConfig {
    pub enable_breaker: bool,
    pub enable_retry: bool,
    pub breaker_first: bool,
    pub timeout: Option<Duration>,
}

impl Default for FaultToleranceConfig {
    fn default() -> Self {
        Self {
            enable_breaker: true,
            enable_retry: true,
            breaker_first: true,
            timeout: None,
        }
    }
}

/// Runs `f` on a detached thread, observing only up to `timeout`. On
/// timeout the call returns `Timeout` without waiting for the closure; the
/// spawned thread is not killed and keeps running to completion (spec §5:
/// "timeouts abandon the pending result but do not kill the thread").
pub(crate) fn run_with_timeout<T: Send + 'static>(
    timeout: Duration,
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(timeout)
        .unwrap_or(Err(TaskmeshError::Timeout(timeout)))
}

/// A configured fault-tolerance wrapper bound to one circuit breaker and one
/// retry policy.
pub struct FaultTolerance {
    config: FaultToleranceConfig,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<RetryExecutor>,
}

impl FaultTolerance {
    pub fn new(
        config: FaultToleranceConfig,
        breaker: Option<Arc<CircuitBreaker>>,
        retry: Option<RetryExecutor>,
    ) -> Self {
        Self {
            config,
            breaker,
            retry,
        }
    }

    fn call_once<T: Send + 'static>(
        &self,
        f: &(dyn Fn() -> Result<T> + Send + Sync),
    ) -> Result<T> {
        match self.config.timeout {
            Some(timeout) => run_with_timeout(timeout, || f()),
            None => f(),
        }
    }

    /// Execute `f` through the composed breaker/retry/timeout stack. `f` may
    /// be invoked more than once if retry is enabled.
    pub fn execute<T: Send + 'static>(
        &self,
        f: impl Fn() -> Result<T> + Send + Sync + 'static,
    ) -> Result<T> {
        let f: Arc<dyn Fn() -> Result<T> + Send + Sync> = Arc::new(f);

        match (
            self.config.enable_breaker,
            self.config.enable_retry,
            self.config.breaker_first,
        ) {
            (true, true, true) => {
                let breaker = self.breaker.as_ref().expect("breaker enabled without one");
                let retry = self.retry.as_ref().expect("retry enabled without one");
                breaker.call(|| retry.execute(|_attempt| self.call_once(&*f)))
            }
            (true, true, false) => {
                let breaker = self.breaker.as_ref().expect("breaker enabled without one");
                let retry = self.retry.as_ref().expect("retry enabled without one");
                retry.execute(|_attempt| breaker.call(|| self.call_once(&*f)))
            }
            (true, false, _) => {
                let breaker = self.breaker.as_ref().expect("breaker enabled without one");
                breaker.call(|| self.call_once(&*f))
            }
            (false, true, _) => {
                let retry = self.retry.as_ref().expect("retry enabled without one");
                retry.execute(|_attempt| self.call_once(&*f))
            }
            (false, false, _) => self.call_once(&*f),
        }
    }
}
