//! Value kind tags and their wire-format codes.

use serde::{Deserialize, Serialize};

/// The type tag carried by every [`crate::value::Value`].
///
/// `Container` is the only kind that holds children instead of scalar bytes;
/// see the invariant on [`crate::value::Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bytes,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Container,
}

impl ValueKind {
    /// Byte-layout width for fixed-width scalar kinds. `None` for variable
    /// length kinds (`Bytes`, `String`) and for `Container`, which carries no
    /// scalar bytes at all.
    pub fn fixed_width(self) -> Option<usize> {
        use ValueKind::*;
        match self {
            Null => Some(0),
            Bool | I8 | U8 => Some(1),
            I16 | U16 => Some(2),
            I32 | U32 | F32 => Some(4),
            I64 | U64 | F64 => Some(8),
            Bytes | String | Container => None,
        }
    }

    /// The single-byte tag used in the binary wire format (spec §6).
    pub fn wire_tag(self) -> u8 {
        use ValueKind::*;
        match self {
            Null => 0,
            Bytes => 1,
            Bool => 2,
            I8 => 3,
            I16 => 4,
            I32 => 5,
            I64 => 6,
            U8 => 7,
            U16 => 8,
            U32 => 9,
            U64 => 10,
            F32 => 11,
            F64 => 12,
            String => 13,
            Container => 14,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        use ValueKind::*;
        Some(match tag {
            0 => Null,
            1 => Bytes,
            2 => Bool,
            3 => I8,
            4 => I16,
            5 => I32,
            6 => I64,
            7 => U8,
            8 => U16,
            9 => U32,
            10 => U64,
            11 => F32,
            12 => F64,
            13 => String,
            14 => Container,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use ValueKind::*;
        match self {
            Null => "null",
            Bytes => "bytes",
            Bool => "bool",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            F32 => "f32",
            F64 => "f64",
            String => "string",
            Container => "container",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tag_round_trips() {
        for kind in [
            ValueKind::Null,
            ValueKind::Bytes,
            ValueKind::Bool,
            ValueKind::I8,
            ValueKind::I16,
            ValueKind::I32,
            ValueKind::I64,
            ValueKind::U8,
            ValueKind::U16,
            ValueKind::U32,
            ValueKind::U64,
            ValueKind::F32,
            ValueKind::F64,
            ValueKind::String,
            ValueKind::Container,
        ] {
            assert_eq!(ValueKind::from_wire_tag(kind.wire_tag()), Some(kind));
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(ValueKind::from_wire_tag(255), None);
    }

    #[test]
    fn fixed_width_matches_little_endian_layout() {
        assert_eq!(ValueKind::I64.fixed_width(), Some(8));
        assert_eq!(ValueKind::Bytes.fixed_width(), None);
        assert_eq!(ValueKind::Container.fixed_width(), None);
    }
}
