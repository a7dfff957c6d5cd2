//! Shared helpers for taskmesh's black-box integration tests.

#![allow(dead_code)]

use std::sync::Once;

use taskmesh::value::{ContainerHeader, ValueContainer};

static TRACING: Once = Once::new();

/// Installs a default `tracing` subscriber once per test process, matching
/// the ambient logging used across the fabric.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// A minimal container, handy wherever a test needs a valid payload and
/// doesn't care about its shape.
pub fn sample_container() -> ValueContainer {
    ValueContainer::new(ContainerHeader::new("test", "", "peer", "", "t", "1.0.0.0"))
}
