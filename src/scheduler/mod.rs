//! # Scheduler (C6)
//!
//! A single background thread driving a min-heap of next-due times over
//! registered schedules, each either a fixed interval or a cron-like
//! expression (see [`cron`]). Each tick recomputes the next-due time as
//! `now + interval` (interval mode) or the next cron match from `now`
//! (cron mode) — missed ticks fire once, they are never caught up, which
//! falls directly out of always computing the next fire relative to the
//! current time rather than the originally scheduled one.

mod cron;

pub use cron::CronExpr;

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, TaskmeshError};
use crate::priority::Priority;
use crate::task::{Task, TaskSystem};
use crate::value::ValueContainer;

/// How a schedule's next-due time is computed.
#[derive(Clone)]
pub enum ScheduleKind {
    Interval(Duration),
    Cron(CronExpr),
}

impl std::fmt::Debug for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleKind::Interval(d) => f.debug_tuple("Interval").field(d).finish(),
            ScheduleKind::Cron(expr) => f.debug_tuple("Cron").field(&expr.as_str()).finish(),
        }
    }
}

/// What a fired schedule submits to the [`TaskSystem`] it targets.
pub struct ScheduleSpec {
    pub handler_name: String,
    pub queue_name: String,
    pub priority: Priority,
    pub kind: ScheduleKind,
    pub payload_factory: Arc<dyn Fn() -> ValueContainer + Send + Sync>,
}

impl std::fmt::Debug for ScheduleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleSpec")
            .field("handler_name", &self.handler_name)
            .field("queue_name", &self.queue_name)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .finish()
    }
}

impl ScheduleSpec {
    pub fn interval(
        handler_name: impl Into<String>,
        interval: Duration,
        payload_factory: Arc<dyn Fn() -> ValueContainer + Send + Sync>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            queue_name: "default".to_string(),
            priority: Priority::Normal,
            kind: ScheduleKind::Interval(interval),
            payload_factory,
        }
    }

    pub fn cron(
        handler_name: impl Into<String>,
        expr: CronExpr,
        payload_factory: Arc<dyn Fn() -> ValueContainer + Send + Sync>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            queue_name: "default".to_string(),
            priority: Priority::Normal,
            kind: ScheduleKind::Cron(expr),
            payload_factory,
        }
    }

    pub fn with_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

struct ScheduleEntry {
    spec: ScheduleSpec,
    enabled: AtomicBool,
}

struct HeapItem {
    due: Instant,
    id: String,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.due.cmp(&self.due)
    }
}

/// Periodic/cron-style dispatch of tasks into a [`TaskSystem`] (spec §4.6).
pub struct Scheduler {
    target: Arc<TaskSystem>,
    entries: DashMap<String, Arc<ScheduleEntry>>,
    heap: Mutex<BinaryHeap<HeapItem>>,
    wake: Condvar,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("schedules", &self.entries.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new(target: Arc<TaskSystem>) -> Arc<Self> {
        Arc::new(Self {
            target,
            entries: DashMap::new(),
            heap: Mutex::new(BinaryHeap::new()),
            wake: Condvar::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    /// Spawns the dispatch thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.thread.lock().unwrap();
        if guard.is_some() {
            return Err(TaskmeshError::InvalidState("scheduler already running".into()));
        }
        self.shutdown.store(false, Ordering::SeqCst);
        let this = self.clone();
        *guard = Some(std::thread::spawn(move || this.run_loop()));
        info!("scheduler started");
        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("scheduler stopped");
    }

    /// Registers a schedule, returning its id. Enabled by default.
    pub fn add(&self, spec: ScheduleSpec) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let due = self.initial_due(&spec.kind)?;
        self.entries.insert(
            id.clone(),
            Arc::new(ScheduleEntry {
                spec,
                enabled: AtomicBool::new(true),
            }),
        );
        self.heap.lock().unwrap().push(HeapItem { due, id: id.clone() });
        self.wake.notify_all();
        Ok(id)
    }

    /// Re-enables a disabled schedule without resetting its next-due time.
    pub fn enable(&self, id: &str) -> Result<()> {
        let entry = self.entries.get(id).ok_or_else(|| TaskmeshError::not_found(id))?;
        entry.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Disables a schedule without removing it; its next-due time keeps
    /// advancing but it will not dispatch until re-enabled.
    pub fn disable(&self, id: &str) -> Result<()> {
        let entry = self.entries.get(id).ok_or_else(|| TaskmeshError::not_found(id))?;
        entry.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TaskmeshError::not_found(id))
    }

    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.entries.get(id).map(|e| e.enabled.load(Ordering::SeqCst))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn initial_due(&self, kind: &ScheduleKind) -> Result<Instant> {
        match kind {
            ScheduleKind::Interval(interval) => Ok(Instant::now() + *interval),
            ScheduleKind::Cron(expr) => cron_due_instant(expr),
        }
    }

    fn run_loop(self: Arc<Self>) {
        debug!("scheduler dispatch thread starting");
        loop {
            let mut heap = self.heap.lock().unwrap();
            loop {
                if self.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                match heap.peek() {
                    Some(item) => {
                        let now = Instant::now();
                        if item.due <= now {
                            break;
                        }
                        let (g, _) = self.wake.wait_timeout(heap, item.due - now).unwrap();
                        heap = g;
                    }
                    None => {
                        heap = self.wake.wait(heap).unwrap();
                    }
                }
            }
            let Some(item) = heap.pop() else { continue };
            drop(heap);
            self.fire(item.id);
        }
    }

    fn fire(&self, id: String) {
        let Some(entry) = self.entries.get(&id).map(|e| e.clone()) else {
            return;
        };
        if entry.enabled.load(Ordering::SeqCst) {
            let payload = (entry.spec.payload_factory)();
            let task = Task::new(entry.spec.handler_name.clone(), payload)
                .with_priority(entry.spec.priority)
                .with_queue(entry.spec.queue_name.clone());
            if let Err(e) = self.target.submit(task) {
                warn!(schedule = %id, error = %e, "scheduled task submission failed");
            }
        }
        match &entry.spec.kind {
            ScheduleKind::Interval(interval) => {
                self.heap.lock().unwrap().push(HeapItem {
                    due: Instant::now() + *interval,
                    id,
                });
                self.wake.notify_all();
            }
            ScheduleKind::Cron(expr) => match cron_due_instant(expr) {
                Ok(due) => {
                    self.heap.lock().unwrap().push(HeapItem { due, id });
                    self.wake.notify_all();
                }
                Err(_) => {
                    warn!(schedule = %id, expr = %expr.as_str(), "cron expression has no future match; schedule will not fire again");
                }
            },
        }
    }
}

fn cron_due_instant(expr: &CronExpr) -> Result<Instant> {
    let now = chrono::Utc::now();
    let next_wall = expr
        .next_after(now)
        .ok_or_else(|| TaskmeshError::InvalidArgument(format!("cron expression {} never matches", expr.as_str())))?;
    let delay = (next_wall - now).to_std().unwrap_or(Duration::ZERO);
    Ok(Instant::now() + delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FabricConfig;
    use crate::value::{ContainerHeader, ValueContainer};
    use std::sync::atomic::AtomicUsize;

    fn ok_container() -> ValueContainer {
        ValueContainer::new(ContainerHeader::new("a", "", "b", "", "t", "1.0.0.0"))
    }

    fn system() -> Arc<TaskSystem> {
        TaskSystem::new(
            FabricConfig {
                worker_threads: 2,
                ..Default::default()
            },
            100,
        )
    }

    #[test]
    fn interval_schedule_fires_repeatedly_within_tolerance() {
        let fires = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let fires2 = fires.clone();
        let system = system();
        system
            .register_handler(
                "tick",
                Arc::new(move |_task, _ctx| {
                    fires2.lock().unwrap().push(Instant::now());
                    Ok(ok_container())
                }),
            )
            .unwrap();
        system.start().unwrap();

        let scheduler = Scheduler::new(system.clone());
        scheduler.start().unwrap();
        scheduler
            .add(ScheduleSpec::interval("tick", Duration::from_millis(50), Arc::new(ok_container)))
            .unwrap();

        std::thread::sleep(Duration::from_millis(260));
        scheduler.stop();
        system.stop();

        let observed = fires.lock().unwrap().clone();
        assert!(observed.len() >= 3, "expected at least 3 fires, got {}", observed.len());
        for pair in observed.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= Duration::from_millis(35) && gap <= Duration::from_millis(90),
                "inter-fire gap {gap:?} outside tolerance"
            );
        }
    }

    #[test]
    fn disabled_schedule_does_not_dispatch() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let system = system();
        system
            .register_handler(
                "tick",
                Arc::new(move |_task, _ctx| {
                    count2.fetch_add(1, Ordering::SeqCst);
                    Ok(ok_container())
                }),
            )
            .unwrap();
        system.start().unwrap();

        let scheduler = Scheduler::new(system.clone());
        scheduler.start().unwrap();
        let id = scheduler
            .add(ScheduleSpec::interval("tick", Duration::from_millis(30), Arc::new(ok_container)))
            .unwrap();
        scheduler.disable(&id).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        scheduler.stop();
        system.stop();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_stops_future_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let system = system();
        system
            .register_handler(
                "tick",
                Arc::new(move |_task, _ctx| {
                    count2.fetch_add(1, Ordering::SeqCst);
                    Ok(ok_container())
                }),
            )
            .unwrap();
        system.start().unwrap();

        let scheduler = Scheduler::new(system.clone());
        scheduler.start().unwrap();
        let id = scheduler
            .add(ScheduleSpec::interval("tick", Duration::from_millis(30), Arc::new(ok_container)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(70));
        scheduler.remove(&id).unwrap();
        let seen_before_removal = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        scheduler.stop();
        system.stop();

        assert_eq!(count.load(Ordering::SeqCst), seen_before_removal);
        assert!(scheduler.is_enabled(&id).is_none());
    }
}
