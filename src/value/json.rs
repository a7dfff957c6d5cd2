//! JSON textual form (spec §4.1, §6).
//!
//! The top-level object has keys `header` (the six header fields) and
//! `values` (an ordered array). Each value renders as `{name, kind, data}`,
//! or as `{name, kind: "container", children: [...]}` for container values.
//! Scalars map to JSON primitives; `bytes` values are base64-encoded.

use super::container::ContainerHeader;
use super::kind::ValueKind;
use super::value::Value;
use crate::error::{Result, TaskmeshError};
use base64::Engine;
use serde_json::{json, Map, Value as Json};

fn value_to_json(value: &Value) -> Result<Json> {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(value.name()));
    obj.insert("kind".into(), json!(value.kind().name()));

    if value.is_container() {
        let children: Result<Vec<Json>> = value.children().iter().map(value_to_json).collect();
        obj.insert("children".into(), Json::Array(children?));
        return Ok(Json::Object(obj));
    }

    let data = match value.kind() {
        ValueKind::Null => Json::Null,
        ValueKind::Bool => json!(value.to_bool()?),
        ValueKind::I8 | ValueKind::I16 | ValueKind::I32 | ValueKind::I64 => {
            json!(value.to_i64()?)
        }
        ValueKind::U8 | ValueKind::U16 | ValueKind::U32 | ValueKind::U64 => {
            json!(value.to_u64()?)
        }
        ValueKind::F32 | ValueKind::F64 => json!(value.to_f64()?),
        ValueKind::String => json!(value.to_string_value()?),
        ValueKind::Bytes => {
            json!(base64::engine::general_purpose::STANDARD.encode(value.to_bytes_value()?))
        }
        ValueKind::Container => unreachable!("handled above"),
    };
    obj.insert("data".into(), data);
    Ok(Json::Object(obj))
}

pub(crate) fn to_json(header: &ContainerHeader, values: &[Value]) -> Result<String> {
    let values_json: Result<Vec<Json>> = values.iter().map(value_to_json).collect();
    let doc = json!({
        "header": {
            "source_id": header.source_id,
            "source_sub_id": header.source_sub_id,
            "target_id": header.target_id,
            "target_sub_id": header.target_sub_id,
            "message_type": header.message_type,
            "version": header.version,
        },
        "values": values_json?,
    });
    serde_json::to_string(&doc).map_err(|e| TaskmeshError::ParseError(e.to_string()))
}
