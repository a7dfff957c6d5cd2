//! `Task` and its lifecycle (spec §3).

use uuid::Uuid;

use crate::priority::Priority;
use crate::value::ValueContainer;

/// A task's position in its monotone lifecycle. Terminal states
/// (`Completed`, `Failed`, `DeadLettered`, `Cancelled`) never leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    DeadLettered,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::DeadLettered | Self::Cancelled
        )
    }
}

/// A unit of work submitted to the [`super::TaskSystem`].
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub handler_name: String,
    pub payload: ValueContainer,
    pub priority: Priority,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub timeout: Option<std::time::Duration>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub queue_name: String,
}

impl Task {
    /// A task with the defaults from spec §6 (`max_retries` = 3, the
    /// default queue, normal priority, no deadline, due immediately).
    pub fn new(handler_name: impl Into<String>, payload: ValueContainer) -> Self {
        Self {
            task_id: String::new(),
            handler_name: handler_name.into(),
            payload,
            priority: Priority::Normal,
            attempt_count: 0,
            max_attempts: 3,
            timeout: None,
            scheduled_at: None,
            queue_name: "default".to_string(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    pub fn scheduled_at(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Assigns a task id if one was not already set.
    pub(crate) fn ensure_id(&mut self) {
        if self.task_id.is_empty() {
            self.task_id = Uuid::new_v4().to_string();
        }
    }
}

/// The stored outcome of a completed task run, keyed by `task_id` in the
/// result-retention cache.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub state: TaskState,
    pub value: Option<ValueContainer>,
    pub error: Option<String>,
    pub attempt_count: u32,
}
