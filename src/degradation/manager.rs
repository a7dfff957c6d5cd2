//! Degradation manager (spec §4.9): per-service degradation level, monotone
//! raise plus explicit recover-to-Normal.

use dashmap::DashMap;

use super::level::DegradationLevel;

/// Tracks the current degradation level for every named service.
#[derive(Debug, Default)]
pub struct DegradationManager {
    levels: DashMap<String, DegradationLevel>,
}

impl DegradationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, service: &str) -> DegradationLevel {
        self.levels
            .get(service)
            .map(|l| *l)
            .unwrap_or(DegradationLevel::Normal)
    }

    /// Raise `service`'s level to at least `level`; never lowers it here.
    /// Returns the resulting level.
    pub fn degrade(&self, service: &str, level: DegradationLevel, reason: &str) -> DegradationLevel {
        let mut entry = self
            .levels
            .entry(service.to_string())
            .or_insert(DegradationLevel::Normal);
        if level > *entry {
            tracing::warn!(service, from = %*entry, to = %level, reason, "service degraded");
            *entry = level;
        }
        *entry
    }

    /// Reset `service` to `Normal`.
    pub fn recover(&self, service: &str) {
        if let Some(mut entry) = self.levels.get_mut(service) {
            if *entry != DegradationLevel::Normal {
                tracing::info!(service, "service recovered to normal");
            }
            *entry = DegradationLevel::Normal;
        }
    }

    pub fn is_degraded(&self, service: &str) -> bool {
        self.level(service) != DegradationLevel::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrade_raises_monotonically() {
        let mgr = DegradationManager::new();
        mgr.degrade("svc", DegradationLevel::Limited, "slow");
        assert_eq!(mgr.level("svc"), DegradationLevel::Limited);
        mgr.degrade("svc", DegradationLevel::Normal, "ignored");
        assert_eq!(mgr.level("svc"), DegradationLevel::Limited);
        mgr.degrade("svc", DegradationLevel::Emergency, "worse");
        assert_eq!(mgr.level("svc"), DegradationLevel::Emergency);
    }

    #[test]
    fn recover_resets_to_normal() {
        let mgr = DegradationManager::new();
        mgr.degrade("svc", DegradationLevel::Minimal, "x");
        mgr.recover("svc");
        assert_eq!(mgr.level("svc"), DegradationLevel::Normal);
        assert!(!mgr.is_degraded("svc"));
    }

    #[test]
    fn unknown_service_defaults_to_normal() {
        let mgr = DegradationManager::new();
        assert_eq!(mgr.level("ghost"), DegradationLevel::Normal);
    }
}
