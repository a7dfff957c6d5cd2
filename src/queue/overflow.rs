//! Overflow policies applied when a bounded [`super::JobQueue`] is full at
//! insertion time (spec §4.8, §8 scenario 6).
//!
//! Per the REDESIGN FLAGS guidance on inheritance-based policies, this is a
//! tagged variant with the behavior for each variant implemented once in
//! [`super::job_queue::JobQueue::enqueue`], plus a `Custom` variant carrying a
//! closure for callers that need a policy this set doesn't cover.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// What happened to an insertion attempt against a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowOutcome {
    /// The new item was admitted (possibly after evicting or growing).
    Accepted,
    /// The new item was discarded.
    Rejected,
}

/// The rule applied when `size == max_size` at insertion time.
#[derive(Clone)]
pub enum OverflowPolicy<T> {
    /// Pop the front (oldest) item, then push the new one at the back.
    DropOldest,
    /// Discard the incoming item, leaving the queue unchanged.
    DropNewest,
    /// Wait on the queue's condition variable until space frees up or the
    /// timeout elapses; rejected on timeout.
    Block(Duration),
    /// Grow capacity by `factor` up to `max`, falling back to `DropOldest`
    /// once `max` is reached.
    Grow { factor: f64, max: usize },
    /// An arbitrary caller-supplied policy.
    Custom(Arc<dyn Fn(&T, &mut VecDeque<T>, usize) -> OverflowOutcome + Send + Sync>),
}

impl<T> std::fmt::Debug for OverflowPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DropOldest => write!(f, "DropOldest"),
            Self::DropNewest => write!(f, "DropNewest"),
            Self::Block(d) => write!(f, "Block({d:?})"),
            Self::Grow { factor, max } => write!(f, "Grow {{ factor: {factor}, max: {max} }}"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_oldest_removes_front() {
        let mut q: VecDeque<i32> = (0..3).collect();
        q.pop_front();
        q.push_back(3);
        assert_eq!(q.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
