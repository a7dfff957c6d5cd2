//! # Task System (C5)
//!
//! Wires the [`registry::HandlerRegistry`], a [`crate::pool::WorkerPool`]
//! per named queue, the reliability stack (a per-handler
//! [`crate::reliability::CircuitBreaker`] plus a
//! [`crate::reliability::RetryExecutor`]), progress/result/cancellation
//! bookkeeping, and dead-letter hand-off into one `TaskSystem` facade,
//! following the same "own the components, hand out borrowed references"
//! shape as [`crate::bus::MessageBus`] rather than shared-ownership cycles
//! between tasks and their contexts (spec §9 REDESIGN FLAGS).

mod context;
mod registry;
mod types;

pub use context::TaskContext;
pub use registry::{HandlerRegistry, TaskHandler};
pub use types::{Task, TaskResult, TaskState};

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::FabricConfig;
use crate::error::{Result, TaskmeshError};
use crate::pool::WorkerPool;
use crate::reliability::{
    run_with_timeout, CircuitBreakerConfig, CircuitBreakerRegistry, RetryConfig, RetryExecutor, RetryStrategy,
};
use crate::sink::{DeadLetterSink, NullDeadLetterSink};

/// The task system's own lifecycle, independent of any one queue's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSystemState {
    Stopped,
    Running,
}

struct DelayedEntry {
    due: Instant,
    task: Task,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}
impl Eq for DelayedEntry {}
impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for DelayedEntry {
    /// Reversed so the `BinaryHeap` (a max-heap) pops the *earliest* due
    /// time first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.due.cmp(&self.due)
    }
}

#[derive(Default)]
struct DelayedQueue {
    heap: Mutex<BinaryHeap<DelayedEntry>>,
    wake: Condvar,
}

impl DelayedQueue {
    fn push(&self, due: Instant, task: Task) {
        let mut heap = self.heap.lock().unwrap();
        heap.push(DelayedEntry { due, task });
        drop(heap);
        self.wake.notify_all();
    }
}

/// Handler registry, per-queue worker pools, progress/result bookkeeping,
/// and the reliability stack, composed into one task-execution engine.
pub struct TaskSystem {
    config: FabricConfig,
    registry: HandlerRegistry,
    pools: DashMap<String, Arc<WorkerPool>>,
    states: DashMap<String, TaskState>,
    progress: DashMap<String, (f64, String)>,
    progress_floor: DashMap<String, f64>,
    cancel_flags: DashMap<String, Arc<AtomicBool>>,
    emitted_children: DashMap<String, Vec<String>>,
    results: moka::sync::Cache<String, TaskResult>,
    breakers: CircuitBreakerRegistry,
    dead_letter: Mutex<Arc<dyn DeadLetterSink<Task>>>,
    delayed: Arc<DelayedQueue>,
    delayed_shutdown: Arc<AtomicBool>,
    delayed_thread: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<TaskSystemState>,
}

impl std::fmt::Debug for TaskSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSystem")
            .field("state", &self.state())
            .field("handlers", &self.registry.len())
            .field("queues", &self.pools.len())
            .finish()
    }
}

impl TaskSystem {
    /// `result_retention` bounds the LRU cache of completed task results
    /// (spec §4.5).
    pub fn new(config: FabricConfig, result_retention: u64) -> Arc<Self> {
        let breaker_config = CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold,
            reset_timeout: config.circuit_reset_timeout(),
            ..Default::default()
        };
        Arc::new(Self {
            config,
            registry: HandlerRegistry::new(),
            pools: DashMap::new(),
            states: DashMap::new(),
            progress: DashMap::new(),
            progress_floor: DashMap::new(),
            cancel_flags: DashMap::new(),
            emitted_children: DashMap::new(),
            results: moka::sync::Cache::new(result_retention),
            breakers: CircuitBreakerRegistry::new(breaker_config),
            dead_letter: Mutex::new(Arc::new(NullDeadLetterSink)),
            delayed: Arc::new(DelayedQueue::default()),
            delayed_shutdown: Arc::new(AtomicBool::new(false)),
            delayed_thread: Mutex::new(None),
            state: Mutex::new(TaskSystemState::Stopped),
        })
    }

    pub fn state(&self) -> TaskSystemState {
        *self.state.lock().unwrap()
    }

    pub fn set_dead_letter_sink(&self, sink: Arc<dyn DeadLetterSink<Task>>) {
        *self.dead_letter.lock().unwrap() = sink;
    }

    /// Fails with `AlreadyExists` on duplicate registration.
    pub fn register_handler(&self, name: impl Into<String>, handler: TaskHandler) -> Result<()> {
        self.registry.register(name, handler)
    }

    /// Spawns the default queue's worker pool and the scheduled-task
    /// dispatch thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == TaskSystemState::Running {
                return Err(TaskmeshError::InvalidState("task system already running".into()));
            }
            *state = TaskSystemState::Running;
        }
        self.get_or_start_pool("default")?;

        self.delayed_shutdown.store(false, Ordering::SeqCst);
        let this = self.clone();
        let mut thread_guard = self.delayed_thread.lock().unwrap();
        *thread_guard = Some(std::thread::spawn(move || this.run_delayed_loop()));
        info!("task system started");
        Ok(())
    }

    /// Stops every queue's worker pool (draining in-flight jobs) and the
    /// scheduled-task dispatch thread.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != TaskSystemState::Running {
                return;
            }
            *state = TaskSystemState::Stopped;
        }
        self.delayed_shutdown.store(true, Ordering::SeqCst);
        self.delayed.wake.notify_all();
        if let Some(handle) = self.delayed_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        for pool in self.pools.iter() {
            pool.value().stop(false);
        }
        info!("task system stopped");
    }

    fn get_or_start_pool(&self, queue_name: &str) -> Result<Arc<WorkerPool>> {
        if let Some(existing) = self.pools.get(queue_name) {
            return Ok(existing.clone());
        }
        let pool = Arc::new(WorkerPool::new(
            format!("task-{queue_name}"),
            self.config.worker_threads,
        ));
        pool.start()?;
        self.pools.insert(queue_name.to_string(), pool.clone());
        Ok(pool)
    }

    fn run_delayed_loop(self: Arc<Self>) {
        debug!("scheduled-task dispatch thread starting");
        loop {
            let mut guard = self.delayed.heap.lock().unwrap();
            loop {
                if self.delayed_shutdown.load(Ordering::SeqCst) {
                    return;
                }
                match guard.peek() {
                    Some(top) => {
                        let now = Instant::now();
                        if top.due <= now {
                            break;
                        }
                        let (g, _) = self.delayed.wake.wait_timeout(guard, top.due - now).unwrap();
                        guard = g;
                    }
                    None => {
                        guard = self.delayed.wake.wait(guard).unwrap();
                    }
                }
            }
            let Some(entry) = guard.pop() else { continue };
            drop(guard);
            self.dispatch_now(entry.task);
        }
    }

    /// Validates the handler is known, assigns an id if absent, and either
    /// enqueues the task for immediate execution or holds it for its
    /// `scheduled_at` time (spec §4.5 "Scheduling hook").
    pub fn submit(self: &Arc<Self>, mut task: Task) -> Result<String> {
        if self.state() != TaskSystemState::Running {
            return Err(TaskmeshError::InvalidState("task system is not running".into()));
        }
        if !self.registry.contains(&task.handler_name) {
            return Err(TaskmeshError::NoHandler(task.handler_name.clone()));
        }
        task.ensure_id();
        let task_id = task.task_id.clone();
        self.states.insert(task_id.clone(), TaskState::Pending);

        if let Some(scheduled_at) = task.scheduled_at {
            let delay = scheduled_at - chrono::Utc::now();
            if delay > chrono::Duration::zero() {
                let due = Instant::now() + delay.to_std().unwrap_or(Duration::ZERO);
                self.delayed.push(due, task);
                return Ok(task_id);
            }
        }
        self.dispatch_now(task);
        Ok(task_id)
    }

    fn cancel_flag_for(&self, task_id: &str) -> Arc<AtomicBool> {
        self.cancel_flags
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// Sets the cancellation flag. A task still `Pending` transitions
    /// directly to `Cancelled` without ever invoking its handler; a
    /// `Running` task only sees the flag on its next cooperative check.
    pub fn cancel(&self, task_id: &str) {
        self.cancel_flag_for(task_id).store(true, Ordering::SeqCst);
    }

    pub fn query_progress(&self, task_id: &str) -> Option<(f64, String)> {
        self.progress.get(task_id).map(|e| e.clone())
    }

    pub fn query_state(&self, task_id: &str) -> Option<TaskState> {
        self.states.get(task_id).map(|e| *e)
    }

    pub fn query_result(&self, task_id: &str) -> Option<TaskResult> {
        self.results.get(task_id)
    }

    pub fn query_emitted_children(&self, task_id: &str) -> Vec<String> {
        self.emitted_children.get(task_id).map(|e| e.clone()).unwrap_or_default()
    }

    fn dispatch_now(self: &Arc<Self>, task: Task) {
        let queue_name = task.queue_name.clone();
        let pool = match self.get_or_start_pool(&queue_name) {
            Ok(pool) => pool,
            Err(e) => {
                warn!(queue = %queue_name, error = %e, "could not start queue pool for task");
                return;
            }
        };
        let this = self.clone();
        let task_id = task.task_id.clone();
        let _ = pool.submit(format!("task-{task_id}"), move || {
            this.run_task(task);
            Ok(())
        });
    }

    fn set_state(&self, task_id: &str, state: TaskState) {
        self.states.insert(task_id.to_string(), state);
    }

    fn finalize(&self, task: &Task, state: TaskState, value: Option<crate::value::ValueContainer>, error: Option<String>, attempts: u32) {
        self.set_state(&task.task_id, state);
        self.results.insert(
            task.task_id.clone(),
            TaskResult {
                task_id: task.task_id.clone(),
                state,
                value,
                error,
                attempt_count: attempts,
            },
        );
    }

    fn run_task(self: &Arc<Self>, task: Task) {
        let task_id = task.task_id.clone();
        let cancel_flag = self.cancel_flag_for(&task_id);
        if cancel_flag.load(Ordering::SeqCst) {
            self.finalize(&task, TaskState::Cancelled, None, None, 0);
            return;
        }
        let Some(handler) = self.registry.get(&task.handler_name) else {
            self.finalize(&task, TaskState::Failed, None, Some(format!("no handler: {}", task.handler_name)), 0);
            return;
        };

        self.set_state(&task_id, TaskState::Running);
        let breaker = self.breakers.get_or_create(&task.handler_name);
        let max_attempts = task.max_attempts.max(1);
        let retry = RetryExecutor::new(RetryConfig {
            max_attempts,
            base_delay: self.config.retry_base_delay(),
            multiplier: 2.0,
            strategy: RetryStrategy::Exponential,
            jitter: true,
            should_retry: Arc::new(|e| !matches!(e, TaskmeshError::Cancelled)),
        });

        let emitted: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let timeout = task.timeout;
        let outcome = retry.execute(|attempt| {
            if cancel_flag.load(Ordering::SeqCst) {
                return Err(TaskmeshError::Cancelled);
            }
            if attempt > 1 {
                self.set_state(&task_id, TaskState::Retrying);
                self.progress_floor.remove(&task_id);
            }
            self.set_state(&task_id, TaskState::Running);

            let this = self.clone();
            let sink_task_id = task_id.clone();
            let sink: Arc<dyn Fn(f64, &str) + Send + Sync> = Arc::new(move |fraction, message| {
                let mut last = this.progress_floor.entry(sink_task_id.clone()).or_insert(0.0);
                let clamped = if fraction < *last {
                    warn!(task = %sink_task_id, fraction, floor = *last, "progress report below monotone floor, clamping");
                    *last
                } else {
                    *last = fraction;
                    fraction
                };
                this.progress.insert(sink_task_id.clone(), (clamped, message.to_string()));
            });

            let ctx = TaskContext::new(attempt, cancel_flag.clone(), sink);
            let attempt_task = Task {
                task_id: task_id.clone(),
                handler_name: task.handler_name.clone(),
                payload: task.payload.clone(),
                priority: task.priority,
                attempt_count: attempt,
                max_attempts,
                timeout,
                scheduled_at: None,
                queue_name: task.queue_name.clone(),
            };
            let emitted_for_call = emitted.clone();
            // `ctx` is owned by whichever call runs the handler so it can be
            // moved onto a detached thread for the timeout case; either way
            // it is finalized and drained into `emitted` from the same place
            // the handler actually ran.
            let run_once = {
                let handler = handler.clone();
                move |mut ctx: TaskContext| -> Result<crate::value::ValueContainer> {
                    let result = (handler)(attempt_task, &mut ctx);
                    ctx.mark_finished();
                    emitted_for_call.lock().unwrap().extend(ctx.take_emitted_children());
                    result
                }
            };
            breaker.call(|| match timeout {
                // Spec §5: on elapse the call returns `Timeout` without
                // waiting for the closure; the spawned thread is not killed
                // and keeps running to completion on its own.
                Some(deadline) => run_with_timeout(deadline, move || run_once(ctx)),
                None => run_once(ctx),
            })
        });

        self.emitted_children.insert(task_id.clone(), emitted.lock().unwrap().clone());

        match outcome {
            Ok(value) => self.finalize(&task, TaskState::Completed, Some(value), None, max_attempts),
            Err(TaskmeshError::Cancelled) => self.finalize(&task, TaskState::Cancelled, None, None, 0),
            Err(e) => {
                self.dead_letter.lock().unwrap().accept(&task, &e.to_string(), max_attempts);
                self.finalize(&task, TaskState::DeadLettered, None, Some(e.to_string()), max_attempts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ContainerHeader, ValueContainer};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    fn config() -> FabricConfig {
        FabricConfig {
            worker_threads: 2,
            retry_base_delay_ms: 5,
            ..Default::default()
        }
    }

    fn ok_container() -> ValueContainer {
        ValueContainer::new(ContainerHeader::new("a", "", "b", "", "t", "1.0.0.0"))
    }

    #[test]
    fn submit_without_handler_is_rejected() {
        let system = TaskSystem::new(config(), 100);
        system.start().unwrap();
        let task = Task::new("ghost", ok_container());
        let err = system.submit(task).unwrap_err();
        assert_eq!(err.code(), "no_handler");
        system.stop();
    }

    #[test]
    fn successful_task_reaches_completed_with_result() {
        let system = TaskSystem::new(config(), 100);
        system
            .register_handler("work", Arc::new(|_task, _ctx| Ok(ok_container())))
            .unwrap();
        system.start().unwrap();
        let id = system.submit(Task::new("work", ok_container())).unwrap();
        let deadline = Instant::now() + StdDuration::from_secs(2);
        while system.query_state(&id) != Some(TaskState::Completed) && Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(system.query_state(&id), Some(TaskState::Completed));
        assert!(system.query_result(&id).is_some());
        system.stop();
    }

    #[test]
    fn progress_reports_are_observable_and_monotone() {
        let system = TaskSystem::new(config(), 100);
        system
            .register_handler(
                "progressive",
                Arc::new(|_task, ctx| {
                    ctx.report_progress(0.25, "a");
                    ctx.report_progress(0.5, "b");
                    ctx.report_progress(0.1, "regressed");
                    ctx.report_progress(1.0, "done");
                    Ok(ok_container())
                }),
            )
            .unwrap();
        system.start().unwrap();
        let id = system.submit(Task::new("progressive", ok_container())).unwrap();
        let deadline = Instant::now() + StdDuration::from_secs(2);
        while system.query_state(&id) != Some(TaskState::Completed) && Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(5));
        }
        let (fraction, message) = system.query_progress(&id).unwrap();
        assert_eq!(fraction, 1.0);
        assert_eq!(message, "done");
        system.stop();
    }

    #[test]
    fn exhausted_retries_route_to_dead_letter() {
        struct CountingSink {
            count: Arc<AtomicU32>,
        }
        impl DeadLetterSink<Task> for CountingSink {
            fn accept(&self, _item: &Task, _reason: &str, _attempts: u32) {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
        let system = TaskSystem::new(config(), 100);
        let dlq_count = Arc::new(AtomicU32::new(0));
        system.set_dead_letter_sink(Arc::new(CountingSink { count: dlq_count.clone() }));
        system
            .register_handler(
                "always_fails",
                Arc::new(|_task, _ctx| Err(TaskmeshError::OperationFailed("nope".into()))),
            )
            .unwrap();
        system.start().unwrap();
        let id = system
            .submit(Task::new("always_fails", ok_container()).with_max_attempts(2))
            .unwrap();
        let deadline = Instant::now() + StdDuration::from_secs(2);
        while system.query_state(&id) != Some(TaskState::DeadLettered) && Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(system.query_state(&id), Some(TaskState::DeadLettered));
        assert_eq!(dlq_count.load(Ordering::SeqCst), 1);
        system.stop();
    }

    #[test]
    fn cancel_before_run_skips_the_handler() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let system = TaskSystem::new(config(), 100);
        system
            .register_handler(
                "maybe",
                Arc::new(move |_task, _ctx| {
                    ran2.store(true, Ordering::SeqCst);
                    Ok(ok_container())
                }),
            )
            .unwrap();
        // Don't start the pool yet; cancel the id we pre-assign so the
        // worker sees the flag set before it ever invokes the handler.
        system.start().unwrap();
        let mut task = Task::new("maybe", ok_container());
        task.ensure_id();
        system.cancel(&task.task_id);
        let id = system.submit(task).unwrap();
        let deadline = Instant::now() + StdDuration::from_secs(1);
        while system.query_state(&id) != Some(TaskState::Cancelled) && Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(system.query_state(&id), Some(TaskState::Cancelled));
        assert!(!ran.load(Ordering::SeqCst));
        system.stop();
    }

    #[test]
    fn handler_exceeding_timeout_does_not_block_the_worker() {
        let system = TaskSystem::new(config(), 100);
        system
            .register_handler(
                "slow",
                Arc::new(|_task, _ctx| {
                    std::thread::sleep(StdDuration::from_millis(500));
                    Ok(ok_container())
                }),
            )
            .unwrap();
        system.start().unwrap();
        let id = system
            .submit(
                Task::new("slow", ok_container())
                    .with_max_attempts(1)
                    .with_timeout(StdDuration::from_millis(20)),
            )
            .unwrap();
        let deadline = Instant::now() + StdDuration::from_millis(300);
        while system.query_state(&id) != Some(TaskState::DeadLettered) && Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(system.query_state(&id), Some(TaskState::DeadLettered));
        let result = system.query_result(&id).unwrap();
        assert!(result.error.unwrap().contains("timed out"));
        system.stop();
    }

    #[test]
    fn scheduled_at_future_defers_execution() {
        let system = TaskSystem::new(config(), 100);
        system
            .register_handler("delayed", Arc::new(|_task, _ctx| Ok(ok_container())))
            .unwrap();
        system.start().unwrap();
        let due = chrono::Utc::now() + chrono::Duration::milliseconds(80);
        let id = system
            .submit(Task::new("delayed", ok_container()).scheduled_at(due))
            .unwrap();
        assert_eq!(system.query_state(&id), Some(TaskState::Pending));
        std::thread::sleep(StdDuration::from_millis(40));
        assert_eq!(system.query_state(&id), Some(TaskState::Pending));
        std::thread::sleep(StdDuration::from_millis(200));
        assert_eq!(system.query_state(&id), Some(TaskState::Completed));
        system.stop();
    }
}
