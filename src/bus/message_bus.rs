//! `MessageBus` (spec §4.4): the process-wide pub/sub router.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{Result, TaskmeshError};
use crate::sink::{DeadLetterSink, NullDeadLetterSink};

use crate::priority_queue::PriorityJobQueue;

use super::message::Message;
use super::stats::{BusStatistics, BusStatsSnapshot};
use super::subscription::{DeliveryMode, Filter, Handler, Subscription};

/// The bus's own lifecycle, independent of any one subscriber (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for BusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// A message-before-dispatch transform applied uniformly to every publish;
/// the original message is never mutated (copy-on-transform).
pub type Transformer = Arc<dyn Fn(&Message) -> Message + Send + Sync>;

struct DispatchJob {
    message: Message,
    subscription: Arc<Subscription>,
}

/// State a worker-mode dispatch thread needs, shared via `Arc` so it can
/// outlive the `MessageBus` call that enqueued the job.
struct DispatchShared {
    stats: BusStatistics,
    dead_letter: Mutex<Arc<dyn DeadLetterSink<Message>>>,
}

/// Process-wide pub/sub router: topic matching, priority-aware worker-mode
/// dispatch, filters, a global transform hook, and a dead-letter hand-off
/// for subscribers that fail.
pub struct MessageBus {
    subscriptions: DashMap<String, Arc<Subscription>>,
    state: Mutex<BusState>,
    shared: Arc<DispatchShared>,
    global_filter: Mutex<Option<Filter>>,
    transformer: Mutex<Option<Transformer>>,
    dispatch_queue: Arc<PriorityJobQueue<DispatchJob>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl MessageBus {
    pub fn new(worker_threads: usize) -> Self {
        Self {
            subscriptions: DashMap::new(),
            state: Mutex::new(BusState::Stopped),
            shared: Arc::new(DispatchShared {
                stats: BusStatistics::new(),
                dead_letter: Mutex::new(Arc::new(NullDeadLetterSink)),
            }),
            global_filter: Mutex::new(None),
            transformer: Mutex::new(None),
            dispatch_queue: Arc::new(PriorityJobQueue::new()),
            workers: Mutex::new(Vec::new()),
            worker_count: worker_threads.max(1),
        }
    }

    pub fn state(&self) -> BusState {
        *self.state.lock().unwrap()
    }

    pub fn set_global_filter(&self, filter: Filter) {
        *self.global_filter.lock().unwrap() = Some(filter);
    }

    pub fn set_transformer(&self, transformer: Transformer) {
        *self.transformer.lock().unwrap() = Some(transformer);
    }

    pub fn set_dead_letter_sink(&self, sink: Arc<dyn DeadLetterSink<Message>>) {
        *self.shared.dead_letter.lock().unwrap() = sink;
    }

    /// `Stopped -> Starting -> Running`. Spawns the worker-mode dispatch
    /// threads that drain `dispatch_queue` in priority order.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != BusState::Stopped {
                return Err(TaskmeshError::InvalidState(format!(
                    "bus cannot start from state {state}"
                )));
            }
            *state = BusState::Starting;
        }
        let mut handles = self.workers.lock().unwrap();
        for index in 0..self.worker_count {
            let queue = self.dispatch_queue.clone();
            let shared = self.shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bus-dispatch-{index}"))
                .spawn(move || {
                    while let Some(job) = queue.dequeue() {
                        run_dispatch_job(job, &shared);
                    }
                })
                .expect("failed to spawn bus dispatch thread");
            handles.push(handle);
        }
        drop(handles);
        *self.state.lock().unwrap() = BusState::Running;
        info!(workers = self.worker_count, "message bus started");
        Ok(())
    }

    /// `Running -> Stopping -> Stopped`. Lets in-flight worker-mode
    /// dispatches drain for up to `grace_period`, then forcibly stops;
    /// anything still queued is dropped (spec §5: "dropped or forwarded to
    /// the dead-letter sink per config" — this bus drops, matching the
    /// spec's stated default).
    pub fn stop(&self, grace_period: Duration) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != BusState::Running {
                return;
            }
            *state = BusState::Stopping;
        }
        let deadline = std::time::Instant::now() + grace_period;
        while !self.dispatch_queue.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.dispatch_queue.stop();
        let mut handles = self.workers.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        *self.state.lock().unwrap() = BusState::Stopped;
        info!("message bus stopped");
    }

    /// Register a subscription, returning its id.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: Handler,
        delivery_mode: DeliveryMode,
        filter: Option<Filter>,
    ) -> String {
        let sub = Arc::new(Subscription::new(pattern, handler, delivery_mode, filter));
        let id = sub.id.clone();
        self.subscriptions.insert(id.clone(), sub);
        id
    }

    /// Idempotent: removing an unknown id is a no-op, not an error.
    pub fn unsubscribe(&self, id: &str) {
        self.subscriptions.remove(id);
    }

    /// Publish `message`, returning the number of subscribers matched (after
    /// filters) and handed off for dispatch — for worker-mode subscribers
    /// this counts admission to the dispatch queue, not completion.
    pub fn publish(&self, message: Message) -> Result<usize> {
        if self.state() != BusState::Running {
            return Err(TaskmeshError::BusNotRunning(self.state().to_string()));
        }
        self.shared.stats.record_published();

        let effective = match &*self.transformer.lock().unwrap() {
            Some(t) => t(&message),
            None => message,
        };

        // Copy-on-write snapshot: dispatch without holding the subscription
        // map's lock during handler invocation (spec §5).
        let snapshot: Vec<Arc<Subscription>> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.pattern.matches(effective.topic()))
            .map(|entry| entry.value().clone())
            .collect();

        let global_filter = self.global_filter.lock().unwrap().clone();
        let mut dispatched = 0usize;
        for sub in snapshot {
            let global_ok = global_filter.as_ref().is_none_or(|f| f(&effective));
            let sub_ok = sub.filter.as_ref().is_none_or(|f| f(&effective));
            if !global_ok || !sub_ok {
                self.shared.stats.record_filtered(sub.pattern.as_str());
                continue;
            }
            match sub.delivery_mode {
                DeliveryMode::Inline => {
                    self.invoke_inline(&effective, &sub);
                }
                DeliveryMode::Worker => {
                    self.dispatch_queue.enqueue(
                        effective.priority(),
                        DispatchJob {
                            message: effective.clone(),
                            subscription: sub.clone(),
                        },
                    );
                }
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn invoke_inline(&self, message: &Message, sub: &Arc<Subscription>) {
        match (sub.handler)(message) {
            Ok(()) => self.shared.stats.record_dispatched(sub.pattern.as_str()),
            Err(e) => {
                warn!(subscription = %sub.id, error = %e, "inline subscriber failed");
                self.shared.stats.record_failed(sub.pattern.as_str());
                let tagged = message.with_metadata("failure_reason", e.to_string());
                self.shared.dead_letter.lock().unwrap().accept(&tagged, &e.to_string(), 1);
            }
        }
    }

    pub fn stats(&self) -> BusStatsSnapshot {
        self.shared.stats.snapshot(self.dispatch_queue.len())
    }

    pub fn pattern_stats(&self, pattern: &str) -> (u64, u64, u64) {
        self.shared.stats.pattern_snapshot(pattern)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

fn run_dispatch_job(job: DispatchJob, shared: &DispatchShared) {
    let pattern = job.subscription.pattern.as_str().to_string();
    match (job.subscription.handler)(&job.message) {
        Ok(()) => shared.stats.record_dispatched(&pattern),
        Err(e) => {
            debug!(subscription = %job.subscription.id, error = %e, "worker-mode subscriber failed");
            shared.stats.record_failed(&pattern);
            let tagged = job.message.with_metadata("failure_reason", e.to_string());
            shared.dead_letter.lock().unwrap().accept(&tagged, &e.to_string(), 1);
        }
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        if self.state() == BusState::Running {
            self.stop(Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::super::message::MessageType;

    #[test]
    fn publish_before_start_is_rejected() {
        let bus = MessageBus::new(1);
        let msg = Message::builder("t", MessageType::Event).build();
        assert!(matches!(bus.publish(msg), Err(TaskmeshError::BusNotRunning(_))));
    }

    #[test]
    fn inline_dispatch_runs_synchronously_and_counts_matches() {
        let bus = MessageBus::new(1);
        bus.start().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        bus.subscribe(
            "t",
            Arc::new(move |_m: &Message| {
                seen2.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(())
            }),
            DeliveryMode::Inline,
            None,
        );
        let msg = Message::builder("t", MessageType::Event).build();
        let count = bus.publish(msg).unwrap();
        assert_eq!(count, 1);
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 1);
        bus.stop(Duration::from_millis(50));
    }

    #[test]
    fn unsubscribe_is_idempotent_for_unknown_id() {
        let bus = MessageBus::new(1);
        bus.unsubscribe("does-not-exist");
        bus.unsubscribe("does-not-exist");
    }

    #[test]
    fn filtered_subscriber_is_not_counted_as_dispatched() {
        let bus = MessageBus::new(1);
        bus.start().unwrap();
        bus.subscribe(
            "t",
            Arc::new(|_m: &Message| Ok(())),
            DeliveryMode::Inline,
            Some(Arc::new(|_m: &Message| false)),
        );
        let msg = Message::builder("t", MessageType::Event).build();
        let count = bus.publish(msg).unwrap();
        assert_eq!(count, 0);
        assert_eq!(bus.stats().filtered, 1);
        bus.stop(Duration::from_millis(50));
    }

    #[test]
    fn priority_dispatch_scenario() {
        let bus = MessageBus::new(1);
        bus.start().unwrap();
        let order: Arc<StdMutex<Vec<Priority>>> = Arc::new(StdMutex::new(Vec::new()));
        let order2 = order.clone();
        // Block the single worker on the first dispatch so the remaining
        // four publishes queue up before any of them run.
        let gate = Arc::new(std::sync::Barrier::new(2));
        let gate2 = gate.clone();
        let first = Arc::new(AtomicBool::new(true));
        bus.subscribe(
            "t",
            Arc::new(move |m: &Message| {
                if first.swap(false, AtomicOrdering::SeqCst) {
                    gate2.wait();
                }
                order2.lock().unwrap().push(m.priority());
                Ok(())
            }),
            DeliveryMode::Worker,
            None,
        );
        for p in [Priority::Low, Priority::Critical, Priority::Normal, Priority::High, Priority::Low] {
            let msg = Message::builder("t", MessageType::Event).priority(p).build();
            bus.publish(msg).unwrap();
        }
        gate.wait();
        std::thread::sleep(Duration::from_millis(100));
        bus.stop(Duration::from_millis(200));
        let observed = order.lock().unwrap().clone();
        assert_eq!(
            observed,
            vec![Priority::Low, Priority::Critical, Priority::High, Priority::Normal, Priority::Low]
        );
    }
}
