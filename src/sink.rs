//! Dead-letter sink (spec §6): the external collaborator that receives
//! messages or tasks which have exhausted their retry budget. The core
//! never retries onto the sink — per spec, this is a terminal hand-off.

/// Accepts items that have exhausted their delivery/retry budget.
///
/// Implemented once per payload type (`Message` for the bus, `Task` for the
/// task system) rather than via an inheritance hierarchy, per the
/// REDESIGN FLAGS guidance on inheritance-based collaborators.
pub trait DeadLetterSink<T>: Send + Sync {
    fn accept(&self, item: &T, failure_reason: &str, attempt_count: u32);
}

/// A sink that discards everything, logging at `warn` level. The default
/// when no sink is configured, matching the spec's "dropped or forwarded to
/// the dead-letter sink per config" fallback.
#[derive(Debug, Default)]
pub struct NullDeadLetterSink;

impl<T> DeadLetterSink<T> for NullDeadLetterSink {
    fn accept(&self, _item: &T, failure_reason: &str, attempt_count: u32) {
        tracing::warn!(failure_reason, attempt_count, "dead-lettered item discarded (no sink configured)");
    }
}
