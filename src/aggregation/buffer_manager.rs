//! `BufferManager` (spec §4.10), ported from `buffer_manager.h`'s background
//! periodic-flush loop: one [`MetricWindow`] per metric name, flushed on a
//! timer to a [`MetricSink`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::window::{MetricSnapshot, MetricWindow};
use crate::error::Result;

/// The external storage/telemetry collaborator a [`BufferManager`] flushes
/// to. Analogous to the original `metric_storage` sink.
pub trait MetricSink: Send + Sync {
    fn write(&self, snapshot: &MetricSnapshot) -> Result<()>;
}

/// A sink that drops everything, useful for tests and as a safe default.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn write(&self, _snapshot: &MetricSnapshot) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BufferManagerStatistics {
    pub total_flushes: AtomicU64,
    pub failed_flushes: AtomicU64,
    pub background_cycles: AtomicU64,
}

impl BufferManagerStatistics {
    pub fn flush_success_rate(&self) -> f64 {
        let total = self.total_flushes.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let failed = self.failed_flushes.load(Ordering::Relaxed);
        1.0 - (failed as f64 / total as f64)
    }
}

pub struct BufferManagerConfig {
    pub background_check_interval: Duration,
    pub default_percentiles: Vec<f64>,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self {
            background_check_interval: Duration::from_millis(100),
            default_percentiles: super::window::DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

struct Shared {
    config: BufferManagerConfig,
    windows: DashMap<String, Mutex<MetricWindow>>,
    sink: Mutex<Arc<dyn MetricSink>>,
    stats: BufferManagerStatistics,
    shutdown: AtomicBool,
    wake: Condvar,
    wake_lock: Mutex<()>,
}

/// Owns one rolling window per metric and periodically flushes snapshots to
/// a [`MetricSink`] from a background thread.
pub struct BufferManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferManager {
    pub fn new(config: BufferManagerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                windows: DashMap::new(),
                sink: Mutex::new(Arc::new(NullSink)),
                stats: BufferManagerStatistics::default(),
                shutdown: AtomicBool::new(false),
                wake: Condvar::new(),
                wake_lock: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn set_sink(&self, sink: Arc<dyn MetricSink>) {
        *self.shared.sink.lock().unwrap() = sink;
    }

    /// Feed one observation into the named metric's window, lazily creating
    /// the window on first use.
    pub fn record(&self, metric_name: &str, value: f64) {
        let entry = self
            .shared
            .windows
            .entry(metric_name.to_string())
            .or_insert_with(|| {
                Mutex::new(MetricWindow::with_percentiles(
                    metric_name,
                    &self.shared.config.default_percentiles,
                ))
            });
        entry.lock().unwrap().add_observation(value);
    }

    pub fn snapshot(&self, metric_name: &str) -> Option<MetricSnapshot> {
        self.shared
            .windows
            .get(metric_name)
            .map(|w| w.lock().unwrap().snapshot())
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.shared.windows.iter().map(|e| e.key().clone()).collect()
    }

    pub fn statistics(&self) -> &BufferManagerStatistics {
        &self.shared.stats
    }

    /// Flush every metric's current snapshot to the sink immediately,
    /// without waiting for the background timer.
    pub fn force_flush_all(&self) {
        Self::flush_all(&self.shared);
    }

    pub fn remove_buffer(&self, metric_name: &str) {
        if let Some((_, window)) = self.shared.windows.remove(metric_name) {
            Self::flush_one(&self.shared, metric_name, &window.lock().unwrap().snapshot());
        }
    }

    pub fn clear_all_buffers(&self) {
        self.shared.windows.clear();
    }

    fn flush_one(shared: &Shared, metric_name: &str, snapshot: &MetricSnapshot) {
        let sink = shared.sink.lock().unwrap().clone();
        shared.stats.total_flushes.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = sink.write(snapshot) {
            shared.stats.failed_flushes.fetch_add(1, Ordering::Relaxed);
            warn!(metric = metric_name, error = %e, "metric flush failed");
        }
    }

    fn flush_all(shared: &Arc<Shared>) {
        for entry in shared.windows.iter() {
            let snapshot = entry.value().lock().unwrap().snapshot();
            Self::flush_one(shared, entry.key(), &snapshot);
        }
        shared.stats.background_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Start the background flush thread. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.worker.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let shared = self.shared.clone();
        *guard = Some(std::thread::spawn(move || {
            debug!("buffer manager background flush loop starting");
            loop {
                {
                    let lock = shared.wake_lock.lock().unwrap();
                    let (_lock, _timeout) = shared
                        .wake
                        .wait_timeout(lock, shared.config.background_check_interval)
                        .unwrap();
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                Self::flush_all(&shared);
            }
            Self::flush_all(&shared);
            debug!("buffer manager background flush loop stopped");
        }));
    }

    /// Stop the background thread, performing one final flush.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        writes: AtomicUsize,
    }

    impl MetricSink for CountingSink {
        fn write(&self, _snapshot: &MetricSnapshot) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn record_lazily_creates_a_window_per_metric() {
        let bm = BufferManager::new(BufferManagerConfig::default());
        bm.record("latency_ms", 10.0);
        bm.record("latency_ms", 20.0);
        bm.record("queue_depth", 5.0);
        assert_eq!(bm.metric_names().len(), 2);
        assert_eq!(bm.snapshot("latency_ms").unwrap().count, 2);
    }

    #[test]
    fn force_flush_all_writes_every_metric_once() {
        let bm = BufferManager::new(BufferManagerConfig::default());
        let sink = Arc::new(CountingSink::default());
        bm.set_sink(sink.clone());
        bm.record("a", 1.0);
        bm.record("b", 2.0);
        bm.force_flush_all();
        assert_eq!(sink.writes.load(Ordering::SeqCst), 2);
        assert_eq!(bm.statistics().total_flushes.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn background_thread_flushes_on_timer_and_stops_cleanly() {
        let bm = Arc::new(BufferManager::new(BufferManagerConfig {
            background_check_interval: Duration::from_millis(10),
            ..Default::default()
        }));
        let sink = Arc::new(CountingSink::default());
        bm.set_sink(sink.clone());
        bm.record("a", 1.0);
        bm.start();
        std::thread::sleep(Duration::from_millis(60));
        bm.stop();
        assert!(sink.writes.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn remove_buffer_flushes_before_dropping() {
        let bm = BufferManager::new(BufferManagerConfig::default());
        let sink = Arc::new(CountingSink::default());
        bm.set_sink(sink.clone());
        bm.record("a", 1.0);
        bm.remove_buffer("a");
        assert_eq!(sink.writes.load(Ordering::SeqCst), 1);
        assert!(bm.metric_names().is_empty());
    }
}
