use tracing::debug;
use uuid::Uuid;

use crate::codec::{BasePropertyCodec, PropertyCodec};
use crate::entity::MemberInfo;
use crate::error::{ErrorKind, TableResult};
use crate::types::{MemberType, PropertyBag, Value};
use crate::{bail, table_error};

/// Largest binary payload stored in a single property.
pub const BINARY_CHUNK_SIZE: usize = 64 * 1024;

/// Largest string payload, in UTF-16 code units, stored in a single property.
pub const STRING_CHUNK_UNITS: usize = 32 * 1024;

/// Primary slot value marking a binary member whose payload lives in overflow properties.
pub const OVERFLOW_BINARY_SENTINEL: Uuid = Uuid::from_u128(0x8d5a04be_6f0c_4d9e_b2a7_43c1e0f9a6d2);

/// Primary slot value marking a string member whose payload lives in overflow properties.
pub const OVERFLOW_STRING_SENTINEL: &str = "{8d5a04be-6f0c-4d9e-b2a7-43c1e0f9a6d2}:overflow";

const OVERFLOW_INFIX: &str = "_overflow_";

/// Stores large binary or string members across `{name}_overflow_{i}` properties.
///
/// Values that fit in one property are stored exactly like [`BasePropertyCodec`] does.
#[derive(Debug, Clone, Default)]
pub struct OverflowPropertyCodec {
    base: BasePropertyCodec,
}

impl OverflowPropertyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            base: BasePropertyCodec::named(name),
        }
    }

    fn chunk_name(name: &str, index: usize) -> String {
        format!("{name}{OVERFLOW_INFIX}{index}")
    }

    fn is_sentinel(value: &Value) -> bool {
        match value {
            Value::Binary(bytes) => bytes.as_slice() == OVERFLOW_BINARY_SENTINEL.as_bytes(),
            Value::String(text) => text == OVERFLOW_STRING_SENTINEL,
            _ => false,
        }
    }

    /// Collects the overflow chunks of `name` ordered by their numeric index.
    fn collect_chunks<'a>(name: &str, properties: &'a PropertyBag) -> TableResult<Vec<&'a Value>> {
        let prefix = format!("{name}{OVERFLOW_INFIX}");
        let mut chunks: Vec<(usize, &Value)> = properties
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix(&prefix)?.parse::<usize>().ok()?;
                Some((index, value))
            })
            .collect();

        if chunks.is_empty() {
            bail!(
                ErrorKind::OverflowChainCorrupted,
                "Overflow sentinel found without overflow properties",
                format!("property `{name}`")
            );
        }

        chunks.sort_by_key(|(index, _)| *index);
        for (expected, (index, _)) in chunks.iter().enumerate() {
            if *index != expected {
                bail!(
                    ErrorKind::OverflowChainCorrupted,
                    "Overflow properties are not contiguous",
                    format!("property `{name}` is missing chunk {expected}")
                );
            }
        }

        Ok(chunks.into_iter().map(|(_, value)| value).collect())
    }
}

impl PropertyCodec for OverflowPropertyCodec {
    fn property_name<'a>(&'a self, member: &'a MemberInfo) -> &'a str {
        self.base.property_name(member)
    }

    fn validate(&self, member: &MemberInfo) -> TableResult<()> {
        match member.member_type {
            MemberType::Binary | MemberType::String => Ok(()),
            other => bail!(
                ErrorKind::UnsupportedMemberType,
                "Overflow storage needs a binary or string member",
                format!("member `{}` has type {other:?}", member.name)
            ),
        }
    }

    fn convert_value(&self, value: &Value, member: &MemberInfo) -> TableResult<Vec<(String, Value)>> {
        let name = self.property_name(member);

        let (sentinel, chunks) = match value {
            Value::Binary(bytes) if bytes.len() > BINARY_CHUNK_SIZE => (
                Value::Binary(OVERFLOW_BINARY_SENTINEL.as_bytes().to_vec()),
                bytes
                    .chunks(BINARY_CHUNK_SIZE)
                    .map(|chunk| Value::Binary(chunk.to_vec()))
                    .collect::<Vec<_>>(),
            ),
            Value::String(text) if text.encode_utf16().count() > STRING_CHUNK_UNITS => (
                Value::String(OVERFLOW_STRING_SENTINEL.to_string()),
                split_utf16(text, STRING_CHUNK_UNITS)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            // A payload equal to the sentinel would read back as a broken chain.
            Value::Binary(_) | Value::String(_) if Self::is_sentinel(value) => {
                (value.clone(), vec![value.clone()])
            }
            _ => return self.base.convert_value(value, member),
        };

        debug!(
            property = name,
            chunks = chunks.len(),
            "splitting member across overflow properties"
        );

        let mut properties = Vec::with_capacity(chunks.len() + 1);
        properties.push((name.to_string(), sentinel));
        properties.extend(
            chunks
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| (Self::chunk_name(name, index), chunk)),
        );

        Ok(properties)
    }

    fn member_value(&self, member: &MemberInfo, properties: &PropertyBag) -> TableResult<Value> {
        let name = self.property_name(member);

        let Some(primary) = properties.get(name) else {
            return Ok(Value::Null);
        };
        if !Self::is_sentinel(primary) {
            return self.base.member_value(member, properties);
        }

        let chunks = Self::collect_chunks(name, properties)?;
        let corrupted = |index: usize| {
            table_error!(
                ErrorKind::OverflowChainCorrupted,
                "Overflow property has the wrong type",
                format!("chunk {index} of property `{name}`")
            )
        };

        match primary {
            Value::Binary(_) => {
                let mut bytes = Vec::new();
                for (index, chunk) in chunks.into_iter().enumerate() {
                    bytes.extend_from_slice(chunk.as_bytes().ok_or_else(|| corrupted(index))?);
                }

                Ok(Value::Binary(bytes))
            }
            _ => {
                let mut text = String::new();
                for (index, chunk) in chunks.into_iter().enumerate() {
                    text.push_str(chunk.as_str().ok_or_else(|| corrupted(index))?);
                }

                Ok(Value::String(text))
            }
        }
    }

    fn reserved_prefix(&self, member: &MemberInfo) -> Option<String> {
        Some(format!("{}{OVERFLOW_INFIX}", self.property_name(member)))
    }

    fn filterable(&self) -> bool {
        false
    }
}

/// Splits `text` into pieces of at most `max_units` UTF-16 code units, never inside a char.
fn split_utf16(text: &str, max_units: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut units = 0;

    for c in text.chars() {
        let width = c.len_utf16();
        if units + width > max_units {
            pieces.push(std::mem::take(&mut current));
            units = 0;
        }

        current.push(c);
        units += width;
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}
