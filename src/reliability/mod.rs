//! # Reliability (C7)
//!
//! Three composable building blocks applied around handler execution:
//! circuit breaking, retrying, and error-boundary isolation/degradation,
//! plus a fault-tolerance layer that composes the first two with an
//! optional timeout.

mod circuit_breaker;
mod error_boundary;
mod fault_tolerance;
mod registry;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig, CircuitBreakerMetrics,
    CircuitState,
};
pub use error_boundary::{ErrorBoundary, ErrorBoundaryGuard, ErrorBoundaryPolicy, ErrorBoundaryRegistry};
pub(crate) use fault_tolerance::run_with_timeout;
pub use fault_tolerance::{FaultTolerance, FaultToleranceConfig};
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryConfig, RetryExecutor, RetryStrategy};
