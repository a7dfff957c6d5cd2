//! Handler registry (spec §4.5): `name -> fn(task, ctx) -> Result<ValueContainer>`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Result, TaskmeshError};
use crate::value::ValueContainer;

use super::context::TaskContext;
use super::types::Task;

/// A registered task handler. Must be thread-safe: the same handler may run
/// concurrently across workers if its queue's pool has concurrency > 1.
pub type TaskHandler = Arc<dyn Fn(Task, &mut TaskContext) -> Result<ValueContainer> + Send + Sync>;

/// Read-heavy name -> handler map (spec §5: "guarded by a reader-writer
/// lock"), backed by `DashMap`'s per-shard locking rather than one global
/// `RwLock`, matching the teacher's concurrent-map idiom elsewhere in this
/// fabric.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, TaskHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `AlreadyExists` on duplicate registration.
    pub fn register(&self, name: impl Into<String>, handler: TaskHandler) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(TaskmeshError::AlreadyExists(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<TaskHandler> {
        self.handlers.get(name).map(|h| h.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ContainerHeader, ValueContainer};

    fn noop_handler() -> TaskHandler {
        Arc::new(|_task, _ctx| Ok(ValueContainer::new(ContainerHeader::new("a", "", "b", "", "t", "1.0.0.0"))))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = HandlerRegistry::new();
        registry.register("work", noop_handler()).unwrap();
        let err = registry.register("work", noop_handler()).unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[test]
    fn unknown_handler_lookup_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("ghost").is_none());
    }
}
