//! A priority-ordered job queue, shared by the bus's worker-mode dispatch
//! (spec §4.4: "the bus maintains a priority-ordered admission into the
//! worker pool... within the same priority level, FIFO is preserved") and
//! the task system's per-queue worker pools (spec §4.5 task priority).
//!
//! Builds on the same mutex+condvar shape as [`crate::queue::JobQueue`],
//! generalized with a `BinaryHeap` ordered by `(priority, insertion_seq)` so
//! one primitive covers both the plain-FIFO and priority-FIFO cases instead
//! of a second hand-rolled wait loop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

use crate::priority::Priority;

struct Entry<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    /// Higher priority sorts greater (max-heap pops it first). Within the
    /// same priority, the *lower* (earlier) sequence number must sort
    /// greater so FIFO order is preserved by the max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Entry<T>>,
    stopped: bool,
    next_seq: u64,
}

/// A bounded-by-nothing priority queue: higher [`Priority`] is dequeued
/// first, FIFO within a priority level.
pub struct PriorityJobQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Default for PriorityJobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityJobQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                stopped: false,
                next_seq: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    pub fn enqueue(&self, priority: Priority, item: T) {
        let mut guard = self.inner.lock().unwrap();
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.heap.push(Entry { priority, seq, item });
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Blocks until an item is available or the queue is stopped.
    pub fn dequeue(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(entry) = guard.heap.pop() {
                return Some(entry.item);
            }
            if guard.stopped {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.stopped = true;
        drop(guard);
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_dequeues_first() {
        let q = PriorityJobQueue::new();
        q.enqueue(Priority::Low, "low");
        q.enqueue(Priority::Critical, "critical");
        q.enqueue(Priority::Normal, "normal");
        assert_eq!(q.dequeue(), Some("critical"));
        assert_eq!(q.dequeue(), Some("normal"));
        assert_eq!(q.dequeue(), Some("low"));
    }

    #[test]
    fn fifo_preserved_within_same_priority() {
        let q = PriorityJobQueue::new();
        q.enqueue(Priority::Normal, 1);
        q.enqueue(Priority::Normal, 2);
        q.enqueue(Priority::Normal, 3);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
    }

    #[test]
    fn scenario_matches_spec_priority_dispatch_example() {
        // low, critical, normal, high, low -> after the first (already
        // in-flight) "low" completes: critical, high, normal, low.
        let q = PriorityJobQueue::new();
        for (p, v) in [
            (Priority::Low, 1),
            (Priority::Critical, 2),
            (Priority::Normal, 3),
            (Priority::High, 4),
            (Priority::Low, 5),
        ] {
            q.enqueue(p, v);
        }
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue()).take(4).collect();
        assert_eq!(order, vec![2, 4, 3, 5]);
    }

    #[test]
    fn stop_wakes_blocked_dequeuer() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;
        let q: Arc<PriorityJobQueue<i32>> = Arc::new(PriorityJobQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue());
        thread::sleep(Duration::from_millis(30));
        q.stop();
        assert_eq!(handle.join().unwrap(), None);
    }
}
