//! # Message Bus (C4)
//!
//! Topic -> subscriber routing with priority-aware worker-mode dispatch,
//! filters, a global transform hook, and bus-level lifecycle state.

mod message;
mod message_bus;
mod stats;
mod subscription;

pub use message::{Message, MessageBuilder, MessageType, Payload};
pub use message_bus::{BusState, MessageBus, Transformer};
pub use stats::BusStatsSnapshot;
pub use subscription::{DeliveryMode, Filter, Handler, Subscription, TopicPattern};
