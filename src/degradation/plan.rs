//! Degradation plans (spec §4.9): a named set of services driven to a common
//! level, plus a disjoint set pushed straight to `Emergency`, executed as one
//! ordered unit.

use std::sync::Mutex;

use super::level::DegradationLevel;
use super::manager::DegradationManager;

/// A plan to be executed against a [`DegradationManager`].
#[derive(Debug, Clone)]
pub struct DegradationPlan {
    pub name: String,
    /// Services raised to `common_level`.
    pub common_services: Vec<String>,
    pub common_level: DegradationLevel,
    /// Services raised straight to `Emergency`, disjoint from `common_services`.
    pub emergency_services: Vec<String>,
    pub reason: String,
}

impl DegradationPlan {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            common_services: Vec::new(),
            common_level: DegradationLevel::Limited,
            emergency_services: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn with_common(mut self, services: impl IntoIterator<Item = impl Into<String>>, level: DegradationLevel) -> Self {
        self.common_services = services.into_iter().map(Into::into).collect();
        self.common_level = level;
        self
    }

    pub fn with_emergency(mut self, services: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.emergency_services = services.into_iter().map(Into::into).collect();
        self
    }
}

/// Serializes plan execution against one manager so two plans never
/// interleave their per-service transitions.
#[derive(Debug, Default)]
pub struct PlanExecutor {
    lock: Mutex<()>,
}

impl PlanExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes `plan`'s transitions in a defined order: common services
    /// first (in listed order), then emergency services.
    pub fn execute(&self, manager: &DegradationManager, plan: &DegradationPlan) {
        let _guard = self.lock.lock().unwrap();
        tracing::info!(plan = %plan.name, reason = %plan.reason, "executing degradation plan");
        for service in &plan.common_services {
            manager.degrade(service, plan.common_level, &plan.reason);
        }
        for service in &plan.emergency_services {
            manager.degrade(service, DegradationLevel::Emergency, &plan.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_applies_common_then_emergency_transitions() {
        let manager = DegradationManager::new();
        let executor = PlanExecutor::new();
        let plan = DegradationPlan::new("outage", "db unreachable")
            .with_common(["reader", "writer"], DegradationLevel::Limited)
            .with_emergency(["billing"]);
        executor.execute(&manager, &plan);
        assert_eq!(manager.level("reader"), DegradationLevel::Limited);
        assert_eq!(manager.level("writer"), DegradationLevel::Limited);
        assert_eq!(manager.level("billing"), DegradationLevel::Emergency);
    }
}
