//! `Message` (spec §3): the immutable unit carried over the bus.

use std::collections::HashMap;

use uuid::Uuid;

use crate::priority::Priority;
use crate::value::ValueContainer;

/// What kind of exchange a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MessageType {
    Command,
    Query,
    Reply,
    Event,
    Notification,
}

/// The payload a message carries: the structured container, or raw bytes
/// for producers that have not adopted the container format.
#[derive(Debug, Clone)]
pub enum Payload {
    Container(ValueContainer),
    Raw(Vec<u8>),
}

/// An immutable message published on the bus.
///
/// Built via [`MessageBuilder`]; once constructed nothing about a `Message`
/// can be mutated, matching the spec's "Immutable after construction".
#[derive(Debug, Clone)]
pub struct Message {
    id: String,
    message_type: MessageType,
    priority: Priority,
    sender: String,
    recipient: Option<String>,
    topic: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    payload: Payload,
    metadata: HashMap<String, String>,
    correlation_id: Option<String>,
}

impl Message {
    pub fn builder(topic: impl Into<String>, message_type: MessageType) -> MessageBuilder {
        MessageBuilder::new(topic, message_type)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// A copy of this message with one metadata entry added, used by the
    /// bus's copy-on-transform contract (the original message published by
    /// the caller is never mutated).
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.metadata.insert(key.into(), value.into());
        clone
    }
}

/// Builder for [`Message`]; mirrors the container's builder-ish
/// construction so every field is set before the value becomes immutable.
#[derive(Debug)]
pub struct MessageBuilder {
    id: Option<String>,
    message_type: MessageType,
    priority: Priority,
    sender: String,
    recipient: Option<String>,
    topic: String,
    payload: Payload,
    metadata: HashMap<String, String>,
    correlation_id: Option<String>,
}

impl MessageBuilder {
    fn new(topic: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: None,
            message_type,
            priority: Priority::default(),
            sender: String::new(),
            recipient: None,
            topic: topic.into(),
            payload: Payload::Raw(Vec::new()),
            metadata: HashMap::new(),
            correlation_id: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn container(mut self, container: ValueContainer) -> Self {
        self.payload = Payload::Container(container);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            message_type: self.message_type,
            priority: self.priority,
            sender: self.sender,
            recipient: self.recipient,
            topic: self.topic,
            timestamp: chrono::Utc::now(),
            payload: self.payload,
            metadata: self.metadata,
            correlation_id: self.correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_a_uuid_when_none_given() {
        let msg = Message::builder("t", MessageType::Event).build();
        assert_eq!(msg.id().len(), 36);
    }

    #[test]
    fn with_metadata_does_not_mutate_the_original() {
        let msg = Message::builder("t", MessageType::Event).build();
        let tagged = msg.with_metadata("failure_reason", "boom");
        assert!(msg.metadata().is_empty());
        assert_eq!(tagged.metadata().get("failure_reason").unwrap(), "boom");
    }
}
