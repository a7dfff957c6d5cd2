//! The unit of work a [`super::WorkerPool`] executes (spec §4.3).

use crate::error::Result;

/// A boxed unit of work submitted to a worker pool. Mirrors the original
/// `job` abstraction: a callable with an optional name for diagnostics.
pub struct Job {
    pub name: String,
    work: Box<dyn FnOnce() -> Result<()> + Send>,
}

impl Job {
    pub fn new(name: impl Into<String>, work: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            name: name.into(),
            work: Box::new(work),
        }
    }

    pub fn run(self) -> Result<()> {
        (self.work)()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}
