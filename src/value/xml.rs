//! XML textual form (spec §4.1).
//!
//! Element names equal value names; a `kind` attribute carries the type tag.
//! Scalars render as element text content; containers nest child elements.

use super::container::ContainerHeader;
use super::kind::ValueKind;
use super::value::Value;
use crate::error::{Result, TaskmeshError};
use base64::Engine;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::io::Cursor;

fn scalar_text(value: &Value) -> Result<String> {
    Ok(match value.kind() {
        ValueKind::Null => String::new(),
        ValueKind::Bool => value.to_bool()?.to_string(),
        ValueKind::I8 | ValueKind::I16 | ValueKind::I32 | ValueKind::I64 => {
            value.to_i64()?.to_string()
        }
        ValueKind::U8 | ValueKind::U16 | ValueKind::U32 | ValueKind::U64 => {
            value.to_u64()?.to_string()
        }
        ValueKind::F32 | ValueKind::F64 => value.to_f64()?.to_string(),
        ValueKind::String => value.to_string_value()?,
        ValueKind::Bytes => base64::engine::general_purpose::STANDARD.encode(value.to_bytes_value()?),
        ValueKind::Container => unreachable!(),
    })
}

fn write_value(writer: &mut Writer<Cursor<Vec<u8>>>, value: &Value) -> Result<()> {
    let mut start = BytesStart::new(value.name());
    start.push_attribute(("kind", value.kind().name()));
    let io_err = |e: quick_xml::Error| TaskmeshError::ParseError(e.to_string());

    if value.is_container() {
        writer.write_event(Event::Start(start)).map_err(io_err)?;
        for child in value.children() {
            write_value(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(value.name())))
            .map_err(io_err)?;
    } else {
        writer.write_event(Event::Start(start)).map_err(io_err)?;
        let text = scalar_text(value)?;
        if !text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(io_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(value.name())))
            .map_err(io_err)?;
    }
    Ok(())
}

pub(crate) fn to_xml(header: &ContainerHeader, values: &[Value]) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let io_err = |e: quick_xml::Error| TaskmeshError::ParseError(e.to_string());

    let mut root = BytesStart::new("container");
    root.push_attribute(("source_id", header.source_id.as_str()));
    root.push_attribute(("source_sub_id", header.source_sub_id.as_str()));
    root.push_attribute(("target_id", header.target_id.as_str()));
    root.push_attribute(("target_sub_id", header.target_sub_id.as_str()));
    root.push_attribute(("message_type", header.message_type.as_str()));
    root.push_attribute(("version", header.version.as_str()));
    writer.write_event(Event::Start(root)).map_err(io_err)?;

    for value in values {
        write_value(&mut writer, value)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("container")))
        .map_err(io_err)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| TaskmeshError::ParseError(e.to_string()))
}
