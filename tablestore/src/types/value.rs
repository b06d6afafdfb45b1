use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, TableError, TableResult};

/// A typed scalar as persisted in a property bag, plus `Null` for absent member values.
///
/// `Null` is never written to the store: a null member simply produces no property.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Double(f64),
    Guid(Uuid),
    Int32(i32),
    Int64(i64),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::DateTime(_) => "datetime",
            Value::Double(_) => "double",
            Value::Guid(_) => "guid",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Binary(_) => "binary",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(value) => Some(value),
            _ => None,
        }
    }

    /// Compares two values of the same variant, widening `Int32` against `Int64`.
    ///
    /// Returns [`None`] for values that have no meaningful order relative to each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int64(b)) => Some(i64::from(*a).cmp(b)),
            (Value::Int64(a), Value::Int32(b)) => Some(a.cmp(&i64::from(*b))),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Converts a possibly-null value into an [`Option`] of the target type.
    pub fn optional<T>(self) -> TableResult<Option<T>>
    where
        T: TryFrom<Value, Error = TableError>,
    {
        match self {
            Value::Null => Ok(None),
            value => T::try_from(value).map(Some),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::String(value) => f.write_str(value),
            Value::Bool(value) => write!(f, "{value}"),
            Value::DateTime(value) => write!(f, "{}", value.to_rfc3339()),
            Value::Double(value) => write!(f, "{value}"),
            Value::Guid(value) => write!(f, "{value}"),
            Value::Int32(value) => write!(f, "{value}"),
            Value::Int64(value) => write!(f, "{value}"),
            Value::Binary(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

/// Declared type of an entity member.
///
/// The scalar variants map one-to-one onto [`Value`]. `Reference` is the id of another
/// entity and is stored as a GUID; `OptionalReference` may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    String,
    Bool,
    DateTime,
    Double,
    Guid,
    Int32,
    Int64,
    Binary,
    Reference,
    OptionalReference,
}

impl MemberType {
    /// Returns `true` when `value` may be assigned to a member of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (MemberType::String, Value::String(_))
                | (MemberType::Bool, Value::Bool(_))
                | (MemberType::DateTime, Value::DateTime(_))
                | (MemberType::Double, Value::Double(_))
                | (MemberType::Guid, Value::Guid(_))
                | (MemberType::Int32, Value::Int32(_))
                | (MemberType::Int64, Value::Int64(_))
                | (MemberType::Binary, Value::Binary(_))
                | (MemberType::Reference, Value::Guid(_))
                | (MemberType::OptionalReference, Value::Guid(_))
        )
    }
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = TableError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        other => bail!(
                            ErrorKind::ConversionError,
                            "Value has an unexpected type",
                            format!("expected {}, got {}", stringify!($variant), other.type_name())
                        ),
                    }
                }
            }
        )*
    };
}

value_conversions! {
    String => String,
    bool => Bool,
    DateTime<Utc> => DateTime,
    f64 => Double,
    Uuid => Guid,
    i32 => Int32,
    i64 => Int64,
    Vec<u8> => Binary,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_null() {
        assert_eq!(Value::from(None::<Uuid>), Value::Null);
        assert_eq!(Value::from(Some(5i32)), Value::Int32(5));
        assert_eq!(Value::Null.optional::<Uuid>().unwrap(), None);
    }

    #[test]
    fn conversions_reject_other_variants() {
        let error = i64::try_from(Value::String("5".into())).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConversionError);
    }

    #[test]
    fn integers_compare_across_widths() {
        assert_eq!(
            Value::Int32(7).compare(&Value::Int64(9)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::String("a".into()).compare(&Value::Int32(1)), None);
    }

    #[test]
    fn references_accept_guids_only() {
        assert!(MemberType::Reference.accepts(&Value::Guid(Uuid::nil())));
        assert!(!MemberType::Reference.accepts(&Value::String("x".into())));
        assert!(MemberType::OptionalReference.accepts(&Value::Null));
    }
}
