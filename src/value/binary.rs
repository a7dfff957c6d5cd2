//! The normative binary wire format (spec §6).
//!
//! ```text
//! HEADER  = u32 version_tag = 0x4D534731 ("MSG1")
//!         , len16 + bytes source_id     (UTF-8)
//!         , len16 + bytes source_sub_id
//!         , len16 + bytes target_id
//!         , len16 + bytes target_sub_id
//!         , len16 + bytes message_type
//!         , len16 + bytes version        (dotted ascii)
//! BODY    = u32 child_count, VALUE*
//! VALUE   = u8 kind_tag
//!         , len16 + bytes name
//!         , u32 size
//!         , bytes[size]                 (scalars)
//!         | u32 child_count, VALUE*     (kind=container)
//! ```
//! All multi-byte integers are little-endian. `len16` is a u16 byte length
//! prefix. Every parsing error is reported, never silently ignored; a corrupt
//! size prefix aborts the parse rather than reading out of bounds.

use super::container::{ContainerHeader, ValueContainer};
use super::kind::ValueKind;
use super::value::Value;
use crate::error::{Result, TaskmeshError};

const MAGIC: u32 = 0x4D53_4731;

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or_else(|| TaskmeshError::ParseError("length overflow".into()))?;
        if end > self.buf.len() {
            return Err(TaskmeshError::ParseError(format!(
                "unexpected end of input: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn len16_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    fn len16_string(&mut self) -> Result<String> {
        let bytes = self.len16_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TaskmeshError::ParseError(format!("invalid UTF-8: {e}")))
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

fn write_len16(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len: u16 = bytes
        .len()
        .try_into()
        .map_err(|_| TaskmeshError::invalid_argument("field exceeds 65535 bytes"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_header(buf: &mut Vec<u8>, header: &ContainerHeader) -> Result<()> {
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    write_len16(buf, header.source_id.as_bytes())?;
    write_len16(buf, header.source_sub_id.as_bytes())?;
    write_len16(buf, header.target_id.as_bytes())?;
    write_len16(buf, header.target_sub_id.as_bytes())?;
    write_len16(buf, header.message_type.as_bytes())?;
    write_len16(buf, header.version.as_bytes())?;
    Ok(())
}

fn read_header(cursor: &mut Cursor) -> Result<ContainerHeader> {
    let magic = cursor.u32()?;
    if magic != MAGIC {
        return Err(TaskmeshError::ParseError(format!(
            "bad magic: expected {MAGIC:#x}, found {magic:#x}"
        )));
    }
    Ok(ContainerHeader::new(
        cursor.len16_string()?,
        cursor.len16_string()?,
        cursor.len16_string()?,
        cursor.len16_string()?,
        cursor.len16_string()?,
        cursor.len16_string()?,
    ))
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    buf.push(value.kind().wire_tag());
    write_len16(buf, value.name().as_bytes())?;
    if value.is_container() {
        let count: u32 = value
            .child_count()
            .try_into()
            .map_err(|_| TaskmeshError::invalid_argument("too many children"))?;
        buf.extend_from_slice(&count.to_le_bytes());
        for child in value.children() {
            write_value(buf, child)?;
        }
    } else {
        let size: u32 = value
            .raw_bytes()
            .len()
            .try_into()
            .map_err(|_| TaskmeshError::invalid_argument("scalar too large"))?;
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(value.raw_bytes());
    }
    Ok(())
}

fn read_value(cursor: &mut Cursor) -> Result<Value> {
    let tag = cursor.u8()?;
    let kind = ValueKind::from_wire_tag(tag)
        .ok_or_else(|| TaskmeshError::ParseError(format!("unknown kind tag {tag}")))?;
    let name = cursor.len16_string()?;
    if kind == ValueKind::Container {
        let mut val = Value::container(name);
        let count = cursor.u32()?;
        for _ in 0..count {
            val.add_child(read_value(cursor)?)?;
        }
        Ok(val)
    } else {
        let size = cursor.u32()? as usize;
        if let Some(expected) = kind.fixed_width() {
            if size != expected {
                return Err(TaskmeshError::ParseError(format!(
                    "corrupt size prefix for {kind}: expected {expected} bytes, found {size}"
                )));
            }
        }
        let bytes = cursor.take(size)?.to_vec();
        let mut val = Value::null(name);
        val.set_scalar(kind, bytes)?;
        Ok(val)
    }
}

pub(crate) fn serialize(header: &ContainerHeader, values: &[Value]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_header(&mut buf, header)?;
    let count: u32 = values
        .len()
        .try_into()
        .map_err(|_| TaskmeshError::invalid_argument("too many top-level values"))?;
    buf.extend_from_slice(&count.to_le_bytes());
    for v in values {
        write_value(&mut buf, v)?;
    }
    Ok(buf)
}

pub(crate) fn parse_body(body: &[u8]) -> Result<Vec<Value>> {
    let mut cursor = Cursor::new(body);
    let count = cursor.u32()?;
    let mut values = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        values.push(read_value(&mut cursor)?);
    }
    Ok(values)
}

pub(crate) fn deserialize(bytes: &[u8]) -> Result<ValueContainer> {
    let mut cursor = Cursor::new(bytes);
    let header = read_header(&mut cursor)?;
    let values = parse_body(cursor.remaining())?;
    Ok(ValueContainer::from_parts(header, values))
}

pub(crate) fn deserialize_header_only(bytes: &[u8]) -> Result<ValueContainer> {
    let mut cursor = Cursor::new(bytes);
    let header = read_header(&mut cursor)?;
    let body = cursor.remaining().to_vec();
    Ok(ValueContainer::from_parts_header_only(header, body))
}
