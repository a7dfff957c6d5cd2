//! # Worker Pool (C3)
//!
//! A fixed set of worker threads draining a shared [`crate::queue::JobQueue`].

mod job;
mod worker_pool;

pub use job::Job;
pub use worker_pool::WorkerPool;
