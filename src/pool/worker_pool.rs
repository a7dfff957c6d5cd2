//! Worker pool (spec §4.3), grounded on the original `thread_pool`'s shape:
//! a fixed set of worker threads draining one shared job queue, with an
//! idle counter for observability and cooperative (non-preemptive)
//! cancellation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::{Result, TaskmeshError};
use crate::queue::{JobQueue, OverflowPolicy};

use super::job::Job;

/// A fixed set of worker threads draining one shared [`JobQueue`].
pub struct WorkerPool {
    name: String,
    size: usize,
    queue: Arc<JobQueue<Job>>,
    idle: Arc<AtomicUsize>,
    running: AtomicBool,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("idle", &self.idle_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self::with_queue(name, size, Arc::new(JobQueue::unbounded()))
    }

    pub fn bounded(name: impl Into<String>, size: usize, capacity: usize, overflow: OverflowPolicy<Job>) -> Self {
        Self::with_queue(name, size, Arc::new(JobQueue::bounded(capacity, overflow)))
    }

    pub fn with_queue(name: impl Into<String>, size: usize, queue: Arc<JobQueue<Job>>) -> Self {
        Self {
            name: name.into(),
            size,
            queue,
            idle: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(false),
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue<Job>> {
        &self.queue
    }

    /// Spawns `size` worker threads. Fails with `InvalidState` if already
    /// running.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TaskmeshError::InvalidState(format!(
                "worker pool '{}' is already running",
                self.name
            )));
        }

        let mut handles = self.workers.lock().unwrap();
        let barrier = Arc::new(Barrier::new(self.size + 1));
        for index in 0..self.size {
            let queue = self.queue.clone();
            let idle = self.idle.clone();
            let name = format!("{}-worker-{}", self.name, index);
            let barrier = barrier.clone();
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    barrier.wait();
                    debug!(worker = %name, "worker thread started");
                    loop {
                        idle.fetch_add(1, Ordering::SeqCst);
                        let job = queue.dequeue();
                        idle.fetch_sub(1, Ordering::SeqCst);
                        match job {
                            Ok(job) => {
                                let job_name = job.name.clone();
                                if let Err(e) = job.run() {
                                    warn!(worker = %name, job = %job_name, error = %e, "job failed");
                                }
                            }
                            Err(_) => break,
                        }
                    }
                    debug!(worker = %name, "worker thread stopped");
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        barrier.wait();
        debug!(pool = %self.name, workers = self.size, "worker pool started");
        Ok(())
    }

    /// Submit a closure as a job. Returns `Ok` iff the enqueue succeeded
    /// (it may still have been dropped by an overflow policy — see the
    /// returned [`crate::queue::OverflowOutcome`]).
    pub fn submit(&self, name: impl Into<String>, work: impl FnOnce() -> Result<()> + Send + 'static) -> Result<()> {
        self.queue.enqueue(Job::new(name, work))?;
        Ok(())
    }

    /// Number of workers currently blocked waiting for a job.
    pub fn idle_count(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Request shutdown. If `immediate` is false, queued jobs are drained
    /// before workers exit; if true, workers stop taking new jobs but the
    /// in-flight job on each worker still runs to completion — cancellation
    /// is cooperative, never preemptive.
    pub fn stop(&self, immediate: bool) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if !immediate {
            while self.queue.len() > 0 {
                std::thread::yield_now();
            }
        }
        self.queue.stop_waiting_dequeue();
        let mut handles = self.workers.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        debug!(pool = %self.name, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[test]
    fn starting_twice_is_rejected() {
        let pool = WorkerPool::new("p", 2);
        pool.start().unwrap();
        let result = pool.start();
        assert!(result.is_err());
        pool.stop(true);
    }

    #[test]
    fn submitted_jobs_run_on_worker_threads() {
        let pool = WorkerPool::new("p", 4);
        pool.start().unwrap();
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit("incr", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) < 50 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        pool.stop(false);
    }

    #[test]
    fn idle_count_tracks_waiting_workers() {
        let pool = WorkerPool::new("p", 3);
        pool.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.idle_count(), 3);
        pool.stop(true);
    }

    #[test]
    fn non_immediate_stop_drains_pending_jobs() {
        let pool = WorkerPool::new("p", 1);
        pool.start().unwrap();
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit("incr", move || {
                std::thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
        pool.stop(false);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
