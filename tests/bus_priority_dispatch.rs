//! Spec §8 scenario 2: priority dispatch.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use taskmesh::bus::{DeliveryMode, Message, MessageBus, MessageType};
use taskmesh::Priority;

#[test]
fn worker_mode_dispatch_drains_in_priority_order() {
    common::init_tracing();

    let bus = MessageBus::new(1);
    bus.start().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    // Block the single worker on the first dispatch so the remaining four
    // publishes queue up, in priority order, before any of them run.
    let gate = Arc::new(Barrier::new(2));
    let gate2 = gate.clone();
    let first = Arc::new(AtomicBool::new(true));
    bus.subscribe(
        "t",
        Arc::new(move |msg| {
            if first.swap(false, Ordering::SeqCst) {
                gate2.wait();
            }
            seen2.lock().unwrap().push(msg.priority());
            Ok(())
        }),
        DeliveryMode::Worker,
        None,
    );

    for priority in [Priority::Low, Priority::Critical, Priority::Normal, Priority::High, Priority::Low] {
        bus.publish(
            Message::builder("t", MessageType::Event)
                .sender("test")
                .priority(priority)
                .build(),
        )
        .unwrap();
    }

    gate.wait();
    std::thread::sleep(Duration::from_millis(100));
    bus.stop(Duration::from_millis(200));

    let observed = seen.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![Priority::Low, Priority::Critical, Priority::High, Priority::Normal, Priority::Low]
    );
}
