//! The `Value` node: typed, self-describing, tree-shaped.

use super::kind::ValueKind;
use crate::error::{Result, TaskmeshError};

/// A single node in a value tree.
///
/// Invariant: `kind == Container` implies `bytes` is empty and `children` may
/// be non-empty; every other kind stores its canonical little-endian scalar
/// bytes in `bytes` and has no children. Ownership is tree-shaped: a value
/// owns its children outright. Parent linkage, when needed by a caller, is
/// non-owning (an index/handle into the owning container), never a second
/// strong reference to the child.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    name: String,
    kind: ValueKind,
    bytes: Vec<u8>,
    children: Vec<Value>,
}

impl Value {
    /// A null-kind value with the given name.
    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Null,
            bytes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// An empty container value, ready to receive children via [`Self::add_child`].
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Container,
            bytes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        self.kind == ValueKind::Null
    }

    pub fn is_container(&self) -> bool {
        self.kind == ValueKind::Container
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Set this value's scalar kind and raw little-endian bytes.
    ///
    /// Fails with `TypeMismatch` if `kind` is `Container` — containers never
    /// carry scalar bytes, only children.
    pub fn set_scalar(&mut self, kind: ValueKind, bytes: Vec<u8>) -> Result<()> {
        if kind == ValueKind::Container {
            return Err(TaskmeshError::TypeMismatch {
                expected: "scalar kind".into(),
                found: "container".into(),
            });
        }
        if let Some(expected) = kind.fixed_width() {
            if bytes.len() != expected {
                return Err(TaskmeshError::TypeMismatch {
                    expected: format!("{expected} bytes for {kind}"),
                    found: format!("{} bytes", bytes.len()),
                });
            }
        }
        self.kind = kind;
        self.bytes = bytes;
        self.children.clear();
        Ok(())
    }

    /// Append a child value. Fails with `TypeMismatch` unless `self` is a
    /// container.
    pub fn add_child(&mut self, child: Value) -> Result<()> {
        if self.kind != ValueKind::Container {
            return Err(TaskmeshError::TypeMismatch {
                expected: "container".into(),
                found: self.kind.name().into(),
            });
        }
        self.children.push(child);
        Ok(())
    }

    pub fn children(&self) -> &[Value] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Children matching a predicate; `only_container` restricts the result
    /// to child values that are themselves containers, mirroring the
    /// `children(only_container)` convenience from the system this was
    /// distilled from.
    pub fn children_matching(&self, only_container: bool) -> Vec<&Value> {
        self.children
            .iter()
            .filter(|c| !only_container || c.is_container())
            .collect()
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name.
    pub fn find_all(&self, name: &str) -> Vec<&Value> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    // -- scalar constructors --------------------------------------------

    pub fn from_bool(name: impl Into<String>, v: bool) -> Self {
        let mut val = Self::null(name);
        val.set_scalar(ValueKind::Bool, vec![v as u8]).unwrap();
        val
    }

    pub fn from_i64(name: impl Into<String>, v: i64) -> Self {
        let mut val = Self::null(name);
        val.set_scalar(ValueKind::I64, v.to_le_bytes().to_vec())
            .unwrap();
        val
    }

    pub fn from_u64(name: impl Into<String>, v: u64) -> Self {
        let mut val = Self::null(name);
        val.set_scalar(ValueKind::U64, v.to_le_bytes().to_vec())
            .unwrap();
        val
    }

    pub fn from_f64(name: impl Into<String>, v: f64) -> Self {
        let mut val = Self::null(name);
        val.set_scalar(ValueKind::F64, v.to_le_bytes().to_vec())
            .unwrap();
        val
    }

    pub fn from_string(name: impl Into<String>, v: impl Into<String>) -> Self {
        let mut val = Self::null(name);
        val.set_scalar(ValueKind::String, v.into().into_bytes())
            .unwrap();
        val
    }

    pub fn from_bytes(name: impl Into<String>, v: Vec<u8>) -> Self {
        let mut val = Self::null(name);
        val.set_scalar(ValueKind::Bytes, v).unwrap();
        val
    }

    // -- checked conversions ----------------------------------------------
    // Numeric conversions never silently truncate: the source kind must be
    // exactly the requested width/signedness-compatible kind, or an integer
    // value that losslessly widens/narrows via `to_*` is rejected too —
    // conversion is only ever same-kind. String access on a null value
    // returns "" without error; every other non-string kind is an error.

    fn scalar_bytes<const N: usize>(&self, to: &str) -> Result<[u8; N]> {
        self.bytes
            .get(..N)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| TaskmeshError::conversion(self.kind.name(), to))
    }

    pub fn to_bool(&self) -> Result<bool> {
        match self.kind {
            ValueKind::Bool => Ok(self.bytes.first().copied().unwrap_or(0) != 0),
            ValueKind::Null => Err(TaskmeshError::NullAccess {
                name: self.name.clone(),
            }),
            other => Err(TaskmeshError::conversion(other.name(), "bool")),
        }
    }

    pub fn to_i64(&self) -> Result<i64> {
        match self.kind {
            ValueKind::I8 => Ok(*self
                .bytes
                .first()
                .ok_or_else(|| TaskmeshError::conversion(self.kind.name(), "i64"))? as i8 as i64),
            ValueKind::I16 => Ok(i16::from_le_bytes(self.scalar_bytes("i64")?) as i64),
            ValueKind::I32 => Ok(i32::from_le_bytes(self.scalar_bytes("i64")?) as i64),
            ValueKind::I64 => Ok(i64::from_le_bytes(self.scalar_bytes("i64")?)),
            ValueKind::Null => Err(TaskmeshError::NullAccess {
                name: self.name.clone(),
            }),
            other => Err(TaskmeshError::conversion(other.name(), "i64")),
        }
    }

    pub fn to_u64(&self) -> Result<u64> {
        match self.kind {
            ValueKind::U8 => Ok(*self
                .bytes
                .first()
                .ok_or_else(|| TaskmeshError::conversion(self.kind.name(), "u64"))? as u64),
            ValueKind::U16 => Ok(u16::from_le_bytes(self.scalar_bytes("u64")?) as u64),
            ValueKind::U32 => Ok(u32::from_le_bytes(self.scalar_bytes("u64")?) as u64),
            ValueKind::U64 => Ok(u64::from_le_bytes(self.scalar_bytes("u64")?)),
            ValueKind::Null => Err(TaskmeshError::NullAccess {
                name: self.name.clone(),
            }),
            other => Err(TaskmeshError::conversion(other.name(), "u64")),
        }
    }

    pub fn to_f64(&self) -> Result<f64> {
        match self.kind {
            ValueKind::F32 => Ok(f32::from_le_bytes(self.scalar_bytes("f64")?) as f64),
            ValueKind::F64 => Ok(f64::from_le_bytes(self.scalar_bytes("f64")?)),
            ValueKind::Null => Err(TaskmeshError::NullAccess {
                name: self.name.clone(),
            }),
            other => Err(TaskmeshError::conversion(other.name(), "f64")),
        }
    }

    pub fn to_string_value(&self) -> Result<String> {
        match self.kind {
            ValueKind::String => Ok(String::from_utf8_lossy(&self.bytes).into_owned()),
            ValueKind::Null => Ok(String::new()),
            other => Err(TaskmeshError::conversion(other.name(), "string")),
        }
    }

    pub fn to_bytes_value(&self) -> Result<Vec<u8>> {
        match self.kind {
            ValueKind::Bytes => Ok(self.bytes.clone()),
            ValueKind::Null => Err(TaskmeshError::NullAccess {
                name: self.name.clone(),
            }),
            other => Err(TaskmeshError::conversion(other.name(), "bytes")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_scalar_rejects_container_kind() {
        let mut v = Value::null("x");
        let err = v.set_scalar(ValueKind::Container, vec![]).unwrap_err();
        assert_eq!(err.code(), "type_mismatch");
    }

    #[test]
    fn add_child_rejects_non_container() {
        let mut v = Value::from_i64("n", 1);
        let err = v.add_child(Value::null("c")).unwrap_err();
        assert_eq!(err.code(), "type_mismatch");
    }

    #[test]
    fn container_tree_accumulates_children_in_order() {
        let mut root = Value::container("root");
        root.add_child(Value::from_i64("a", 1)).unwrap();
        root.add_child(Value::from_i64("b", 2)).unwrap();
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.children()[0].name(), "a");
        assert_eq!(root.find("b").unwrap().to_i64().unwrap(), 2);
    }

    #[test]
    fn numeric_round_trip_is_exact() {
        assert_eq!(Value::from_i64("x", -42).to_i64().unwrap(), -42);
        assert_eq!(Value::from_u64("x", 42).to_u64().unwrap(), 42);
        assert!((Value::from_f64("x", 1.5).to_f64().unwrap() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn string_access_on_null_is_empty_not_error() {
        let v = Value::null("x");
        assert_eq!(v.to_string_value().unwrap(), "");
    }

    #[test]
    fn conversion_mismatch_is_an_error_not_a_default() {
        let v = Value::from_string("x", "hello");
        let err = v.to_i64().unwrap_err();
        assert_eq!(err.code(), "conversion_error");
    }

    #[test]
    fn null_access_on_scalar_kind_is_distinct_from_conversion_error() {
        let v = Value::null("x");
        let err = v.to_i64().unwrap_err();
        assert_eq!(err.code(), "null_access");
    }
}
