use uuid::Uuid;

use crate::entity::MemberInfo;
use crate::error::{ErrorKind, TableResult};
use crate::keys::{KeyStrategy, KeyTarget};
use crate::types::{MemberType, Value};
use crate::{bail, table_error};

/// Replacement for characters the store does not accept in keys.
const KEY_REPLACEMENT_CHAR: char = '_';

/// Uses the member value itself as the key.
///
/// GUIDs and references are written as 32 lowercase hex digits without dashes, optional
/// references as the empty string when absent, strings sanitized to the key-safe charset
/// and integers in decimal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectKey;

impl KeyStrategy for DirectKey {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn validate(&self, member: &MemberInfo, _target: KeyTarget) -> TableResult<()> {
        ensure_key_type(member)
    }

    fn generate_key(
        &self,
        _row_key: Option<&str>,
        value: &Value,
        member: &MemberInfo,
    ) -> TableResult<Option<String>> {
        format_key_value(value, member).map(Some)
    }

    fn parse_key(&self, key: &str, member: &MemberInfo) -> TableResult<Option<Value>> {
        parse_key_value(key, member).map(Some)
    }
}

fn ensure_key_type(member: &MemberInfo) -> TableResult<()> {
    match member.member_type {
        MemberType::Guid
        | MemberType::Reference
        | MemberType::OptionalReference
        | MemberType::String
        | MemberType::Int32
        | MemberType::Int64 => Ok(()),
        other => bail!(
            ErrorKind::UnsupportedMemberType,
            "Member type cannot be used as a key",
            format!("member `{}` has type {other:?}", member.name)
        ),
    }
}

/// Formats a member value as a key segment according to the member's declared type.
pub fn format_key_value(value: &Value, member: &MemberInfo) -> TableResult<String> {
    ensure_key_type(member)?;

    let formatted = match (member.member_type, value) {
        (MemberType::Guid | MemberType::Reference | MemberType::OptionalReference, Value::Guid(id)) => {
            id.simple().to_string()
        }
        (MemberType::OptionalReference, Value::Null) => String::new(),
        (MemberType::String, Value::String(text)) => sanitize_key(text),
        (MemberType::String, Value::Null) => String::new(),
        (MemberType::Int32, Value::Int32(number)) => number.to_string(),
        (MemberType::Int64, Value::Int64(number)) => number.to_string(),
        (member_type, value) => bail!(
            ErrorKind::ConversionError,
            "Member value does not match its declared type",
            format!(
                "member `{}` is declared {member_type:?} but holds a {} value",
                member.name,
                value.type_name()
            )
        ),
    };

    Ok(formatted)
}

/// Parses a key segment back into a value of the member's declared type.
pub fn parse_key_value(key: &str, member: &MemberInfo) -> TableResult<Value> {
    let value = match member.member_type {
        MemberType::Guid | MemberType::Reference => Value::Guid(parse_guid(key, member)?),
        MemberType::OptionalReference if key.is_empty() => Value::Null,
        MemberType::OptionalReference => Value::Guid(parse_guid(key, member)?),
        MemberType::String => Value::String(key.to_string()),
        MemberType::Int32 => Value::Int32(key.parse()?),
        MemberType::Int64 => Value::Int64(key.parse()?),
        _ => return ensure_key_type(member).map(|_| Value::Null),
    };

    Ok(value)
}

fn parse_guid(key: &str, member: &MemberInfo) -> TableResult<Uuid> {
    Uuid::try_parse(key).map_err(|err| {
        table_error!(
            ErrorKind::ConversionError,
            "Stored key is not a GUID",
            format!("member `{}`, key `{key}`", member.name),
            source: err
        )
    })
}

/// Replaces characters that are not allowed in partition or row keys.
///
/// Forbidden are `/`, `\`, `#`, `?`, the C0 control characters and U+007F to U+009F.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | '#' | '?' => KEY_REPLACEMENT_CHAR,
            c if c.is_control() => KEY_REPLACEMENT_CHAR,
            c => c,
        })
        .collect()
}
