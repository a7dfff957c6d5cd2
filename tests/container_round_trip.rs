//! Spec §8 scenario 1: container round-trip.

mod common;

use taskmesh::value::{ContainerHeader, Value, ValueContainer};

#[test]
fn header_and_child_survive_a_binary_round_trip() {
    common::init_tracing();

    let header = ContainerHeader::new("svc", "", "peer", "", "greet", "1.0.0.0");
    let mut original = ValueContainer::new(header);
    original.add_value(Value::from_string("text", "hello"));

    let bytes = original.serialize().unwrap();
    assert!(bytes.len() >= 40, "serialized form should be at least 40 bytes, got {}", bytes.len());

    let mut restored = ValueContainer::deserialize(&bytes).unwrap();
    assert_eq!(restored.header(), original.header());
    assert_eq!(restored.values().unwrap(), original.values().unwrap());

    let json = restored.to_json().unwrap();
    assert!(json.contains("\"text\""));
    assert!(json.contains("hello"));
}
