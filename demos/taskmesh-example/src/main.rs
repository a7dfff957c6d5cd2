//! Exercises the public API: a bus subscriber, a task handler with
//! progress reporting, and a scheduler that submits a task every second.

use std::sync::Arc;
use std::time::Duration;

use taskmesh::bus::{DeliveryMode, Message, MessageBus, MessageType};
use taskmesh::config::FabricConfig;
use taskmesh::scheduler::{Scheduler, ScheduleSpec};
use taskmesh::task::TaskSystem;
use taskmesh::value::{ContainerHeader, ValueContainer};

fn greeting(name: &str) -> ValueContainer {
    let mut container = ValueContainer::new(ContainerHeader::new(
        "taskmesh-example",
        "",
        "demo",
        "",
        "greeting",
        "1.0.0.0",
    ));
    container.add_value(taskmesh::value::Value::from_string("name", name));
    container
}

fn main() -> taskmesh::Result<()> {
    tracing_subscriber::fmt::init();

    let bus = MessageBus::new(2);
    bus.start()?;
    bus.subscribe(
        "events/*",
        Arc::new(|msg| {
            tracing::info!(topic = msg.topic(), "received event");
            Ok(())
        }),
        DeliveryMode::Worker,
        None,
    );
    bus.publish(
        Message::builder("events/startup", MessageType::Event)
            .sender("main")
            .container(greeting("world"))
            .build(),
    )?;

    let config = FabricConfig::default();
    let system = TaskSystem::new(config, 256);
    system.register_handler(
        "greet",
        Arc::new(|task, ctx| {
            ctx.report_progress(0.5, "greeting");
            let container = task.payload.clone();
            ctx.report_progress(1.0, "done");
            Ok(container)
        }),
    )?;
    system.start()?;
    let task_id = system.submit(taskmesh::task::Task::new("greet", greeting("scheduled")))?;

    let scheduler = Scheduler::new(system.clone());
    scheduler.start()?;
    scheduler.add(ScheduleSpec::interval(
        "greet",
        Duration::from_secs(1),
        Arc::new(|| greeting("scheduler")),
    ))?;

    std::thread::sleep(Duration::from_millis(500));
    tracing::info!(?task_id, state = ?system.query_state(&task_id), "demo task state");

    scheduler.stop();
    system.stop();
    bus.stop(Duration::from_millis(200));
    Ok(())
}
