//! # Buffer & Stream Aggregation (C10)
//!
//! Per-metric rolling statistics ([`MetricWindow`]) and a [`BufferManager`]
//! that flushes them on a timer to a pluggable [`MetricSink`].

mod buffer_manager;
mod p2;
mod window;

pub use buffer_manager::{
    BufferManager, BufferManagerConfig, BufferManagerStatistics, MetricSink, NullSink,
};
pub use p2::P2Estimator;
pub use window::{MetricSnapshot, MetricWindow, DEFAULT_PERCENTILES};
