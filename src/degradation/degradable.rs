//! `DegradableService` (spec §4.9): selects between a normal and a degraded
//! code path based on a service's current degradation level, the same
//! closure-per-branch shape used by [`crate::queue::OverflowPolicy`].

use std::sync::Arc;

use super::level::DegradationLevel;
use super::manager::DegradationManager;

/// A service with two code paths, switched on whether the tracked
/// degradation level has reached `threshold`.
pub struct DegradableService<R> {
    name: String,
    manager: Arc<DegradationManager>,
    threshold: DegradationLevel,
    normal: Box<dyn Fn() -> R + Send + Sync>,
    degraded: Box<dyn Fn() -> R + Send + Sync>,
}

impl<R> std::fmt::Debug for DegradableService<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradableService")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl<R> DegradableService<R> {
    pub fn new(
        name: impl Into<String>,
        manager: Arc<DegradationManager>,
        threshold: DegradationLevel,
        normal: impl Fn() -> R + Send + Sync + 'static,
        degraded: impl Fn() -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            manager,
            threshold,
            normal: Box::new(normal),
            degraded: Box::new(degraded),
        }
    }

    /// Invoke whichever path matches the service's current level.
    pub fn call(&self) -> R {
        if self.manager.level(&self.name) >= self.threshold {
            (self.degraded)()
        } else {
            (self.normal)()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.manager.level(&self.name) >= self.threshold
    }
}
