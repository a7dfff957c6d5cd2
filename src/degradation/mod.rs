//! # Error Boundary & Degradation (C9)
//!
//! Per-service degradation tracking (monotone raise, explicit recover),
//! coordinated multi-service degradation plans, and a service wrapper that
//! switches code paths on level.

mod degradable;
mod level;
mod manager;
mod plan;

pub use degradable::DegradableService;
pub use level::DegradationLevel;
pub use manager::DegradationManager;
pub use plan::{DegradationPlan, PlanExecutor};
