//! `TaskContext` (spec §3): mutable per-run state visible to a handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Per-attempt mutable state owned by the worker executing a task; a
/// `&mut TaskContext` is handed to the handler for the duration of the call.
pub struct TaskContext {
    attempt: u32,
    cancelled: Arc<AtomicBool>,
    progress_sink: Arc<dyn Fn(f64, &str) + Send + Sync>,
    started_at: Instant,
    finished_at: Option<Instant>,
    emitted_children: Vec<String>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("attempt", &self.attempt)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl TaskContext {
    pub(crate) fn new(
        attempt: u32,
        cancelled: Arc<AtomicBool>,
        progress_sink: Arc<dyn Fn(f64, &str) + Send + Sync>,
    ) -> Self {
        Self {
            attempt,
            cancelled,
            progress_sink,
            started_at: Instant::now(),
            finished_at: None,
            emitted_children: Vec::new(),
        }
    }

    /// 1-indexed attempt number for the current run.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Report progress. `fraction` is clamped to `[0.0, 1.0]`; a value lower
    /// than the last reported fraction within this attempt is itself clamped
    /// back up (monotonicity, spec §4.5) and logged rather than accepted.
    pub fn report_progress(&mut self, fraction: f64, message: impl AsRef<str>) {
        let clamped = fraction.clamp(0.0, 1.0);
        (self.progress_sink)(clamped, message.as_ref());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished_at = Some(Instant::now());
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Record a child task emitted during this run, observable afterwards
    /// via [`super::TaskSystem::query_emitted_children`].
    pub fn emit_child(&mut self, task_id: impl Into<String>) {
        self.emitted_children.push(task_id.into());
    }

    pub(crate) fn take_emitted_children(&mut self) -> Vec<String> {
        std::mem::take(&mut self.emitted_children)
    }
}
