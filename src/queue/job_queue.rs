//! # Job Queue (C2)
//!
//! A bounded or unbounded multi-producer/multi-consumer FIFO, the one
//! concurrent-queue primitive every subsystem (worker pool, bus dispatch,
//! scheduler hand-off) builds on — per the REDESIGN FLAGS guidance to
//! consolidate hand-rolled mutex+condvar wait loops into a single primitive
//! with a parameterized overflow policy rather than a re-implementation per
//! call site.
//!
//! Note on the `InvalidArgument`-on-null contract from the design spec: Rust
//! has no null owned values, so that check does not apply here — the type
//! system already rules it out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::error::{Result, TaskmeshError};

use super::overflow::{OverflowOutcome, OverflowPolicy};

struct Inner<T> {
    queue: VecDeque<T>,
    stopped: bool,
    capacity: Option<usize>,
}

/// Observability counters for a [`JobQueue`].
#[derive(Debug, Default)]
pub struct JobQueueStats {
    pub dropped: AtomicU64,
    pub blocked: AtomicU64,
    pub grown: AtomicU64,
}

/// A thread-safe FIFO queue with condition-variable-backed blocking dequeue.
pub struct JobQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    space_available: Condvar,
    notifications_muted: AtomicBool,
    overflow: Option<OverflowPolicy<T>>,
    pub stats: JobQueueStats,
}

impl<T> std::fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> JobQueue<T> {
    /// An unbounded queue with no overflow policy.
    pub fn unbounded() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                stopped: false,
                capacity: None,
            }),
            not_empty: Condvar::new(),
            space_available: Condvar::new(),
            notifications_muted: AtomicBool::new(false),
            overflow: None,
            stats: JobQueueStats::default(),
        }
    }

    /// A bounded queue with the given capacity and overflow policy applied
    /// once the queue is full at insertion time.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy<T>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                stopped: false,
                capacity: Some(capacity),
            }),
            not_empty: Condvar::new(),
            space_available: Condvar::new(),
            notifications_muted: AtomicBool::new(false),
            overflow: Some(overflow),
            stats: JobQueueStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Suppress (or restore) the wake-up notification normally sent on a
    /// successful enqueue. Dequeuers already waiting are unaffected by this
    /// toggle; it only governs future enqueues.
    pub fn set_notifications_muted(&self, muted: bool) {
        self.notifications_muted.store(muted, Ordering::SeqCst);
    }

    fn notify_one(&self) {
        if !self.notifications_muted.load(Ordering::SeqCst) {
            self.not_empty.notify_one();
        }
    }

    /// Enqueue a single job. Fails with `Stopped` if the queue has been
    /// signalled to stop. On success, wakes one waiter unless notifications
    /// are muted.
    pub fn enqueue(&self, job: T) -> Result<OverflowOutcome> {
        let guard = self.inner.lock().unwrap();
        if guard.stopped {
            return Err(TaskmeshError::QueueStopped);
        }
        let (guard, outcome) = self.push_one(guard, job);
        drop(guard);
        if outcome == OverflowOutcome::Accepted {
            self.notify_one();
        }
        Ok(outcome)
    }

    /// Enqueue an entire batch under one lock acquisition: every job is
    /// evaluated against the overflow policy as a unit, and a single
    /// notification is sent after the whole batch rather than per item.
    pub fn enqueue_batch(
        &self,
        jobs: impl IntoIterator<Item = T>,
    ) -> Result<Vec<OverflowOutcome>> {
        let mut guard = self.inner.lock().unwrap();
        if guard.stopped {
            return Err(TaskmeshError::QueueStopped);
        }
        let mut outcomes = Vec::new();
        for job in jobs {
            let (g, outcome) = self.push_one(guard, job);
            guard = g;
            outcomes.push(outcome);
        }
        drop(guard);
        if outcomes.iter().any(|o| *o == OverflowOutcome::Accepted) {
            self.notify_one();
        }
        Ok(outcomes)
    }

    /// Push one job, applying the overflow policy if the queue is full.
    /// Takes and returns the guard by value so the `Block` policy can
    /// release the lock while it waits on `space_available`.
    fn push_one<'a>(
        &'a self,
        mut guard: MutexGuard<'a, Inner<T>>,
        job: T,
    ) -> (MutexGuard<'a, Inner<T>>, OverflowOutcome) {
        let Some(capacity) = guard.capacity else {
            guard.queue.push_back(job);
            return (guard, OverflowOutcome::Accepted);
        };
        if guard.queue.len() < capacity {
            guard.queue.push_back(job);
            return (guard, OverflowOutcome::Accepted);
        }
        match &self.overflow {
            None | Some(OverflowPolicy::DropNewest) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                (guard, OverflowOutcome::Rejected)
            }
            Some(OverflowPolicy::DropOldest) => {
                guard.queue.pop_front();
                guard.queue.push_back(job);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                (guard, OverflowOutcome::Accepted)
            }
            Some(OverflowPolicy::Grow { factor, max }) => {
                let grown = ((capacity as f64) * factor).ceil() as usize;
                let new_cap = grown.min(*max);
                if new_cap > capacity {
                    guard.capacity = Some(new_cap);
                    guard.queue.push_back(job);
                    self.stats.grown.fetch_add(1, Ordering::Relaxed);
                    (guard, OverflowOutcome::Accepted)
                } else {
                    guard.queue.pop_front();
                    guard.queue.push_back(job);
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    (guard, OverflowOutcome::Accepted)
                }
            }
            Some(OverflowPolicy::Block(timeout)) => {
                self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                let deadline = Instant::now() + *timeout;
                loop {
                    if guard.stopped {
                        return (guard, OverflowOutcome::Rejected);
                    }
                    let cap = guard.capacity.unwrap_or(usize::MAX);
                    if guard.queue.len() < cap {
                        guard.queue.push_back(job);
                        return (guard, OverflowOutcome::Accepted);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return (guard, OverflowOutcome::Rejected);
                    }
                    let (g, _timeout_result) = self
                        .space_available
                        .wait_timeout(guard, deadline - now)
                        .unwrap();
                    guard = g;
                }
            }
            Some(OverflowPolicy::Custom(f)) => {
                let outcome = f(&job, &mut guard.queue, capacity);
                if outcome == OverflowOutcome::Accepted {
                    guard.queue.push_back(job);
                }
                (guard, outcome)
            }
        }
    }

    /// Block until a job is available or the queue is stopped.
    pub fn dequeue(&self) -> Result<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(job) = guard.queue.pop_front() {
                self.space_available.notify_one();
                return Ok(job);
            }
            if guard.stopped {
                return Err(TaskmeshError::QueueEmpty);
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    /// Never blocks; `QueueEmpty` if nothing is available right now.
    pub fn try_dequeue(&self) -> Result<T> {
        let mut guard = self.inner.lock().unwrap();
        match guard.queue.pop_front() {
            Some(job) => {
                drop(guard);
                self.space_available.notify_one();
                Ok(job)
            }
            None => Err(TaskmeshError::QueueEmpty),
        }
    }

    /// Atomically drain every queued job, waking all waiters.
    pub fn dequeue_all(&self) -> Vec<T> {
        let mut guard = self.inner.lock().unwrap();
        let drained: Vec<T> = guard.queue.drain(..).collect();
        drop(guard);
        self.space_available.notify_all();
        drained
    }

    /// Idempotent: signal the queue to stop. Waiting dequeuers wake and
    /// return `QueueEmpty` once drained.
    pub fn stop_waiting_dequeue(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.stopped = true;
        drop(guard);
        self.not_empty.notify_all();
        self.space_available.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().unwrap().stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_within_single_producer_thread() {
        let q = JobQueue::unbounded();
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(q.try_dequeue().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn try_dequeue_on_empty_is_queue_empty() {
        let q: JobQueue<i32> = JobQueue::unbounded();
        assert!(matches!(q.try_dequeue(), Err(TaskmeshError::QueueEmpty)));
    }

    #[test]
    fn stop_wakes_blocked_dequeuer_with_queue_empty() {
        let q = Arc::new(JobQueue::<i32>::unbounded());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue());
        thread::sleep(Duration::from_millis(30));
        q.stop_waiting_dequeue();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(TaskmeshError::QueueEmpty)));
    }

    #[test]
    fn stop_waiting_dequeue_is_idempotent() {
        let q: JobQueue<i32> = JobQueue::unbounded();
        q.stop_waiting_dequeue();
        q.stop_waiting_dequeue();
        assert!(q.is_stopped());
        assert!(matches!(q.enqueue(1), Err(TaskmeshError::QueueStopped)));
    }

    #[test]
    fn overflow_drop_oldest_preserves_newest_n() {
        let q = JobQueue::bounded(3, OverflowPolicy::DropOldest);
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        let remaining = q.dequeue_all();
        assert_eq!(remaining, vec![2, 3, 4]);
        assert_eq!(q.stats.dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn overflow_drop_newest_preserves_oldest_n() {
        let q = JobQueue::bounded(3, OverflowPolicy::DropNewest);
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        let remaining = q.dequeue_all();
        assert_eq!(remaining, vec![0, 1, 2]);
        assert_eq!(q.stats.dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn dequeue_all_drains_atomically() {
        let q = JobQueue::unbounded();
        for i in 0..3 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.dequeue_all(), vec![0, 1, 2]);
        assert!(q.is_empty());
    }

    #[test]
    fn enqueue_batch_is_single_notification() {
        let q = Arc::new(JobQueue::<i32>::unbounded());
        let outcomes = q.enqueue_batch(vec![1, 2, 3]).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn grow_policy_expands_capacity_up_to_max() {
        let q = JobQueue::bounded(
            2,
            OverflowPolicy::Grow {
                factor: 2.0,
                max: 4,
            },
        );
        for i in 0..4 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn grow_policy_falls_back_to_drop_oldest_at_max() {
        let q = JobQueue::bounded(
            4,
            OverflowPolicy::Grow {
                factor: 1.0,
                max: 4,
            },
        );
        for i in 0..6 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.dequeue_all(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn block_policy_unblocks_once_space_frees_up() {
        let q = Arc::new(JobQueue::bounded(1, OverflowPolicy::Block(Duration::from_millis(200))));
        q.enqueue(1).unwrap();
        let q2 = q.clone();
        let remover = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            q2.try_dequeue().unwrap()
        });
        let outcome = q.enqueue(2).unwrap();
        assert_eq!(outcome, OverflowOutcome::Accepted);
        remover.join().unwrap();
    }

    #[test]
    fn block_policy_rejects_after_timeout() {
        let q = JobQueue::bounded(1, OverflowPolicy::Block(Duration::from_millis(20)));
        q.enqueue(1).unwrap();
        let outcome = q.enqueue(2).unwrap();
        assert_eq!(outcome, OverflowOutcome::Rejected);
        assert_eq!(q.stats.blocked.load(Ordering::Relaxed), 1);
    }
}
