//! Error boundary (spec §4.7, §9 "RAII scopes").
//!
//! Mirrors the original thread_system's scoped crash-callback registration:
//! registering a boundary returns a guard that deregisters it on `Drop`,
//! with an explicit [`ErrorBoundaryGuard::close`] for early release.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::degradation::{DegradationLevel, DegradationManager};
use crate::error::{Result, TaskmeshError};

/// What happens to an error observed inside a named scope.
#[derive(Debug, Clone)]
pub enum ErrorBoundaryPolicy {
    /// Propagate the error unchanged.
    FailFast,
    /// Mark the scope's service degraded and surface `ServiceDegraded`
    /// instead of the original error.
    Isolate,
    /// After `threshold` consecutive failures, escalate the service's
    /// degradation level to `level`; the original error still propagates.
    Degrade {
        threshold: u32,
        level: DegradationLevel,
    },
    /// Swallow the error and substitute a fallback value, supplied per call
    /// via [`ErrorBoundary::execute_or_fallback`].
    Fallback,
}

struct BoundaryState {
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
}

/// A named error boundary bound to one policy and one service's
/// degradation tracking.
pub struct ErrorBoundary {
    pub(crate) name: String,
    policy: ErrorBoundaryPolicy,
    degradation: Arc<DegradationManager>,
    auto_recover_after: Option<u32>,
    state: BoundaryState,
}

impl std::fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ErrorBoundary {
    pub fn new(
        name: impl Into<String>,
        policy: ErrorBoundaryPolicy,
        degradation: Arc<DegradationManager>,
        auto_recover_after: Option<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            degradation,
            auto_recover_after,
            state: BoundaryState {
                consecutive_failures: AtomicU32::new(0),
                consecutive_successes: AtomicU32::new(0),
            },
        }
    }

    pub fn level(&self) -> DegradationLevel {
        self.degradation.level(&self.name)
    }

    fn record_success(&self) {
        self.state.consecutive_failures.store(0, Ordering::SeqCst);
        if let Some(n) = self.auto_recover_after {
            let successes = self.state.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= n {
                self.degradation.recover(&self.name);
                self.state.consecutive_successes.store(0, Ordering::SeqCst);
            }
        }
    }

    fn handle_error(&self, err: TaskmeshError) -> Result<TaskmeshError> {
        self.state.consecutive_successes.store(0, Ordering::SeqCst);
        match &self.policy {
            ErrorBoundaryPolicy::FailFast => Ok(err),
            ErrorBoundaryPolicy::Isolate => {
                self.degradation
                    .degrade(&self.name, DegradationLevel::Limited, &err.to_string());
                Err(TaskmeshError::ServiceDegraded {
                    service: self.name.clone(),
                    reason: err.to_string(),
                })
            }
            ErrorBoundaryPolicy::Degrade { threshold, level } => {
                let failures = self.state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= *threshold {
                    self.degradation.degrade(&self.name, *level, &err.to_string());
                }
                Ok(err)
            }
            ErrorBoundaryPolicy::Fallback => Ok(err),
        }
    }

    /// Run `f`, applying the boundary's policy on failure. Under
    /// `ErrorBoundaryPolicy::Fallback` this still propagates the error —
    /// use [`Self::execute_or_fallback`] to substitute a value instead.
    pub fn execute<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match f() {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => Err(self.handle_error(e)?),
        }
    }

    /// Run `f`; under `Fallback` policy, substitute `fallback()`'s value
    /// instead of propagating the error.
    pub fn execute_or_fallback<T>(
        &self,
        f: impl FnOnce() -> Result<T>,
        fallback: impl FnOnce() -> T,
    ) -> Result<T> {
        match f() {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                if matches!(self.policy, ErrorBoundaryPolicy::Fallback) {
                    self.state.consecutive_successes.store(0, Ordering::SeqCst);
                    Ok(fallback())
                } else {
                    Err(self.handle_error(e)?)
                }
            }
        }
    }
}

/// A registry of named boundaries supporting scoped (RAII) registration.
#[derive(Debug, Default)]
pub struct ErrorBoundaryRegistry {
    boundaries: DashMap<String, Arc<ErrorBoundary>>,
}

impl ErrorBoundaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ErrorBoundary>> {
        self.boundaries.get(name).map(|b| b.clone())
    }

    /// Register `boundary` under its own name, returning a guard that
    /// deregisters it when dropped (or explicitly closed).
    pub fn register(self: &Arc<Self>, boundary: ErrorBoundary) -> ErrorBoundaryGuard {
        let name = boundary.name.clone();
        let handle = Arc::new(boundary);
        self.boundaries.insert(name.clone(), handle.clone());
        ErrorBoundaryGuard {
            registry: self.clone(),
            name: Some(name),
            boundary: handle,
        }
    }
}

/// RAII handle for a registered [`ErrorBoundary`]. Deregisters the boundary
/// on drop; call [`Self::close`] to release deterministically before then.
pub struct ErrorBoundaryGuard {
    registry: Arc<ErrorBoundaryRegistry>,
    name: Option<String>,
    boundary: Arc<ErrorBoundary>,
}

impl ErrorBoundaryGuard {
    pub fn boundary(&self) -> &ErrorBoundary {
        &self.boundary
    }

    /// Deregister immediately rather than waiting for drop.
    pub fn close(mut self) {
        self.deregister();
    }

    fn deregister(&mut self) {
        if let Some(name) = self.name.take() {
            self.registry.boundaries.remove(&name);
        }
    }
}

impl Drop for ErrorBoundaryGuard {
    fn drop(&mut self) {
        self.deregister();
    }
}
