//! `ValueContainer`: the message envelope carried on every edge of the fabric.

use super::value::Value;
use crate::error::{Result, TaskmeshError};
use serde::{Deserialize, Serialize};

/// The six-field header every container carries, independent of whether its
/// body has been parsed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub source_id: String,
    pub source_sub_id: String,
    pub target_id: String,
    pub target_sub_id: String,
    pub message_type: String,
    /// Dotted `"a.b.c.d"` version string.
    pub version: String,
}

impl ContainerHeader {
    pub fn new(
        source_id: impl Into<String>,
        source_sub_id: impl Into<String>,
        target_id: impl Into<String>,
        target_sub_id: impl Into<String>,
        message_type: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_sub_id: source_sub_id.into(),
            target_id: target_id.into(),
            target_sub_id: target_sub_id.into(),
            message_type: message_type.into(),
            version: version.into(),
        }
    }

    /// Validate the dotted `"a.b.c.d"` integer version form.
    pub fn validate(&self) -> Result<()> {
        let parts: Vec<_> = self.version.split('.').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.parse::<u32>().is_err()) {
            return Err(TaskmeshError::invalid_argument(format!(
                "version must be \"a.b.c.d\" with integer components, got {:?}",
                self.version
            )));
        }
        Ok(())
    }
}

/// Parse state for lazy deserialization (spec §4.1: `HeaderOnly -> FullyParsed`,
/// one-way; `Invalid` rejects every further operation once corruption is
/// detected).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    FullyParsed,
    HeaderOnly,
    Invalid,
}

/// The message envelope: a header plus an ordered sequence of top-level
/// values.
///
/// Invariant: `serialize -> deserialize -> serialize` is byte-identical.
/// Deserialization can be lazy (header-only) via
/// [`ValueContainer::deserialize_header_only`]; the first access to
/// [`ValueContainer::values`] after that triggers a one-time full parse.
#[derive(Debug, Clone)]
pub struct ValueContainer {
    header: ContainerHeader,
    values: Vec<Value>,
    state: ParseState,
    /// Raw body bytes retained for a lazy full parse; cleared once parsed.
    pending_body: Vec<u8>,
}

impl PartialEq for ValueContainer {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.values == other.values
    }
}

impl ValueContainer {
    pub fn new(header: ContainerHeader) -> Self {
        Self {
            header,
            values: Vec::new(),
            state: ParseState::FullyParsed,
            pending_body: Vec::new(),
        }
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn add_value(&mut self, value: Value) {
        self.values.push(value);
    }

    /// The top-level value list, triggering the deferred full parse exactly
    /// once if this container was built via [`Self::deserialize_header_only`].
    pub fn values(&mut self) -> Result<&[Value]> {
        self.ensure_parsed()?;
        Ok(&self.values)
    }

    pub fn find(&mut self, name: &str) -> Result<Option<&Value>> {
        self.ensure_parsed()?;
        Ok(self.values.iter().find(|v| v.name() == name))
    }

    pub fn find_all(&mut self, name: &str) -> Result<Vec<&Value>> {
        self.ensure_parsed()?;
        Ok(self.values.iter().filter(|v| v.name() == name).collect())
    }

    fn ensure_parsed(&mut self) -> Result<()> {
        match self.state {
            ParseState::FullyParsed => Ok(()),
            ParseState::Invalid => Err(TaskmeshError::ContainerInvalid),
            ParseState::HeaderOnly => {
                let body = std::mem::take(&mut self.pending_body);
                match super::binary::parse_body(&body) {
                    Ok(values) => {
                        self.values = values;
                        self.state = ParseState::FullyParsed;
                        Ok(())
                    }
                    Err(e) => {
                        self.state = ParseState::Invalid;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Is this container still awaiting its first full parse?
    pub fn is_header_only(&self) -> bool {
        matches!(self.state, ParseState::HeaderOnly)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.state, ParseState::Invalid)
    }

    pub(crate) fn from_parts_header_only(header: ContainerHeader, body: Vec<u8>) -> Self {
        Self {
            header,
            values: Vec::new(),
            state: ParseState::HeaderOnly,
            pending_body: body,
        }
    }

    pub(crate) fn from_parts(header: ContainerHeader, values: Vec<Value>) -> Self {
        Self {
            header,
            values,
            state: ParseState::FullyParsed,
            pending_body: Vec::new(),
        }
    }

    /// Serialize to the normative binary layout (spec §6). Forces a full
    /// parse first if this container was still header-only.
    pub fn serialize(&mut self) -> Result<Vec<u8>> {
        self.ensure_parsed()?;
        super::binary::serialize(&self.header, &self.values)
    }

    /// Deserialize a full container (header + body fully parsed).
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        super::binary::deserialize(bytes)
    }

    /// Deserialize only the header, leaving the body unparsed until first
    /// access (spec §4.1 lazy parsing).
    pub fn deserialize_header_only(bytes: &[u8]) -> Result<Self> {
        super::binary::deserialize_header_only(bytes)
    }

    pub fn to_json(&mut self) -> Result<String> {
        self.ensure_parsed()?;
        super::json::to_json(&self.header, &self.values)
    }

    pub fn to_xml(&mut self) -> Result<String> {
        self.ensure_parsed()?;
        super::xml::to_xml(&self.header, &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ValueContainer {
        let header = ContainerHeader::new("svc", "", "peer", "", "greet", "1.0.0.0");
        let mut c = ValueContainer::new(header);
        c.add_value(Value::from_string("text", "hello"));
        c
    }

    #[test]
    fn version_must_be_dotted_quad() {
        let header = ContainerHeader::new("a", "", "b", "", "t", "1.0");
        assert!(header.validate().is_err());
        let header = ContainerHeader::new("a", "", "b", "", "t", "1.0.0.0");
        assert!(header.validate().is_ok());
    }

    #[test]
    fn round_trip_preserves_equality() {
        let mut c = sample();
        let bytes = c.serialize().unwrap();
        assert!(bytes.len() >= 40);
        let mut back = ValueContainer::deserialize(&bytes).unwrap();
        assert_eq!(back.values().unwrap(), c.values().unwrap());
        assert_eq!(back.header(), c.header());
    }

    #[test]
    fn serialize_is_byte_identical_across_round_trips() {
        let mut c = sample();
        let first = c.serialize().unwrap();
        let mut back = ValueContainer::deserialize(&first).unwrap();
        let second = back.serialize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn header_only_defers_parse_until_first_access() {
        let mut c = sample();
        let bytes = c.serialize().unwrap();
        let mut lazy = ValueContainer::deserialize_header_only(&bytes).unwrap();
        assert!(lazy.is_header_only());
        let _ = lazy.values().unwrap();
        assert!(!lazy.is_header_only());
    }

    #[test]
    fn to_json_contains_expected_entry() {
        let mut c = sample();
        let json = c.to_json().unwrap();
        assert!(json.contains("\"text\""));
        assert!(json.contains("hello"));
    }

    #[test]
    fn corrupt_size_prefix_marks_container_invalid() {
        let mut c = sample();
        let bytes = c.serialize().unwrap();
        // Truncate mid-body: the value section claims more bytes than remain.
        let truncated = &bytes[..bytes.len() - 3];
        let mut lazy = ValueContainer::deserialize_header_only(truncated).unwrap();
        assert!(lazy.values().is_err());
        assert!(lazy.is_invalid());
        // Once invalid, further operations keep rejecting (no silent recovery).
        assert!(lazy.values().is_err());
    }
}
