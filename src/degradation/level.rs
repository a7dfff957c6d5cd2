//! Degradation level ordering (spec §4.9).

use serde::{Deserialize, Serialize};

/// A monotone severity grade for a service's operating mode. Ordering is
/// `Normal < Limited < Minimal < Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DegradationLevel {
    Normal,
    Limited,
    Minimal,
    Emergency,
}

impl Default for DegradationLevel {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Limited => "limited",
            Self::Minimal => "minimal",
            Self::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(DegradationLevel::Normal < DegradationLevel::Limited);
        assert!(DegradationLevel::Limited < DegradationLevel::Minimal);
        assert!(DegradationLevel::Minimal < DegradationLevel::Emergency);
    }
}
