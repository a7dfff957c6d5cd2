//! # taskmesh
//!
//! An in-process messaging and task-execution fabric: a pub/sub message
//! bus with priority-aware delivery, a task-execution engine with a worker
//! pool, scheduler, retries, and progress/dead-letter handling, a typed
//! value container used as the universal payload format, and a reliability
//! layer (circuit breaker, retry, adaptive backpressure, error boundary,
//! graceful degradation).
//!
//! Everything here runs on OS threads — there is no async runtime. Each
//! subsystem is independently usable; [`bus::MessageBus`] and
//! [`task::TaskSystem`] are the two entry points most applications start
//! from, both configured from a single [`config::FabricConfig`].
//!
//! This crate does not provide cross-process delivery, durable queues,
//! exactly-once delivery, a wire protocol, or a GUI — see `demos/` for a
//! runnable end-to-end example of what it does provide.

pub mod aggregation;
pub mod backpressure;
pub mod bus;
pub mod config;
pub mod degradation;
pub mod error;
pub mod pool;
pub mod priority;
pub mod priority_queue;
pub mod queue;
pub mod reliability;
pub mod scheduler;
pub mod sink;
pub mod task;
pub mod value;

pub use config::FabricConfig;
pub use error::{Result, TaskmeshError};
pub use priority::Priority;
