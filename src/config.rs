//! # Fabric Configuration
//!
//! Holds the environment-agnostic keys from spec §6 (`worker_threads`,
//! `queue_capacity`, `max_retries`, `retry_base_delay_ms`,
//! `circuit_failure_threshold`, `circuit_reset_timeout_ms`,
//! `adaptive_load_low`, `adaptive_load_high`, `overflow_policy`), following
//! `tasker-shared::config::orchestration::OrchestrationConfig`'s style:
//! a module-level doc comment with a TOML example, `#[serde(default)]`
//! fields, and a `validate()` that rejects out-of-range values at
//! construction rather than deep into a run.
//!
//! ```toml
//! worker_threads = 4
//! queue_capacity = 1024
//! max_retries = 3
//! retry_base_delay_ms = 100
//! circuit_failure_threshold = 5
//! circuit_reset_timeout_ms = 30000
//! adaptive_load_low = 0.3
//! adaptive_load_high = 0.7
//! overflow_policy = "drop_newest"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskmeshError};
use crate::queue::OverflowPolicy;

/// The subset of [`OverflowPolicy`] that is representable in config (no
/// `Custom` closure variant).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyKind {
    DropOldest,
    DropNewest,
    Block,
    Grow,
}

impl Default for OverflowPolicyKind {
    fn default() -> Self {
        Self::DropNewest
    }
}

impl OverflowPolicyKind {
    /// Build a concrete [`OverflowPolicy`] from this config value. `Block`
    /// uses a fixed 1s timeout and `Grow` doubles up to 4x capacity;
    /// callers that need different parameters should construct an
    /// [`OverflowPolicy`] directly instead of going through config.
    pub fn to_policy<T>(self) -> OverflowPolicy<T> {
        match self {
            Self::DropOldest => OverflowPolicy::DropOldest,
            Self::DropNewest => OverflowPolicy::DropNewest,
            Self::Block => OverflowPolicy::Block(Duration::from_secs(1)),
            Self::Grow => OverflowPolicy::Grow { factor: 2.0, max: usize::MAX },
        }
    }
}

/// Crate-wide tunables. Defaults match the spec's stated defaults
/// (`DropNewest` overflow with a warning event, per spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub worker_threads: usize,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_ms: u64,
    pub adaptive_load_low: f64,
    pub adaptive_load_high: f64,
    pub overflow_policy: OverflowPolicyKind,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            queue_capacity: 1024,
            max_retries: 3,
            retry_base_delay_ms: 100,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_ms: 30_000,
            adaptive_load_low: 0.3,
            adaptive_load_high: 0.7,
            overflow_policy: OverflowPolicyKind::DropNewest,
        }
    }
}

impl FabricConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn circuit_reset_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_reset_timeout_ms)
    }

    /// Load from a TOML file via the `config` crate, then validate.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(|e| TaskmeshError::ConfigError(e.to_string()))?;
        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| TaskmeshError::ConfigError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject out-of-range values. Mirrors the teacher's per-field
    /// validation approach, applied by hand here since these checks are
    /// cross-field (the two load thresholds must be ordered) rather than
    /// single-field range checks a derive macro could express.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(TaskmeshError::ConfigError(
                "worker_threads must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TaskmeshError::ConfigError(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(TaskmeshError::ConfigError(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(TaskmeshError::ConfigError(
                "circuit_failure_threshold must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.adaptive_load_low) || !(0.0..=1.0).contains(&self.adaptive_load_high) {
            return Err(TaskmeshError::ConfigError(
                "adaptive_load_low/high must be within [0.0, 1.0]".into(),
            ));
        }
        if self.adaptive_load_low >= self.adaptive_load_high {
            return Err(TaskmeshError::ConfigError(
                "adaptive_load_low must be less than adaptive_load_high".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FabricConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_worker_threads_is_rejected() {
        let cfg = FabricConfig {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_load_thresholds_are_rejected() {
        let cfg = FabricConfig {
            adaptive_load_low: 0.8,
            adaptive_load_high: 0.2,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_load_threshold_is_rejected() {
        let cfg = FabricConfig {
            adaptive_load_high: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
