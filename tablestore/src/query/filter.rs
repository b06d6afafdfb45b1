use std::cmp::Ordering;
use std::fmt;

use chrono::SecondsFormat;

use crate::types::{TableRow, Value};

/// Comparison operators supported by store filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }

    /// Applies the operator to two values. Values without a common order only satisfy `ne`.
    pub fn evaluate(&self, left: &Value, right: &Value) -> bool {
        let Some(ordering) = left.compare(right) else {
            return *self == CompareOp::Ne;
        };

        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter over stored rows.
///
/// [`Display`](fmt::Display) renders the OData-style expression understood by remote table
/// stores, while [`Filter::matches`] evaluates it locally.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        property: String,
        op: CompareOp,
        value: Value,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    pub fn compare(property: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn partition_key_eq(partition_key: impl Into<String>) -> Self {
        Filter::compare("PartitionKey", CompareOp::Eq, Value::String(partition_key.into()))
    }

    pub fn row_key_eq(row_key: impl Into<String>) -> Self {
        Filter::compare("RowKey", CompareOp::Eq, Value::String(row_key.into()))
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    /// Combines filters with `and`, returning [`None`] for an empty input.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        filters.into_iter().reduce(Filter::and)
    }

    pub fn matches(&self, row: &TableRow) -> bool {
        match self {
            Filter::Compare {
                property,
                op,
                value,
            } => {
                let stored = row.property(property).unwrap_or(Value::Null);
                op.evaluate(&stored, value)
            }
            Filter::And(left, right) => left.matches(row) && right.matches(row),
            Filter::Or(left, right) => left.matches(row) || right.matches(row),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare {
                property,
                op,
                value,
            } => {
                write!(f, "{property} {op} ")?;
                write_literal(f, value)
            }
            Filter::And(left, right) => write!(f, "({left}) and ({right})"),
            Filter::Or(left, right) => write!(f, "({left}) or ({right})"),
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::String(text) => write!(f, "'{}'", text.replace('\'', "''")),
        Value::Bool(flag) => write!(f, "{flag}"),
        Value::DateTime(when) => write!(
            f,
            "datetime'{}'",
            when.to_rfc3339_opts(SecondsFormat::Micros, true)
        ),
        Value::Double(number) => write!(f, "{number:?}"),
        Value::Guid(id) => write!(f, "guid'{}'", id.hyphenated()),
        Value::Int32(number) => write!(f, "{number}"),
        Value::Int64(number) => write!(f, "{number}L"),
        Value::Binary(bytes) => {
            f.write_str("X'")?;
            for byte in bytes {
                write!(f, "{byte:02x}")?;
            }
            f.write_str("'")
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn renders_odata_literals() {
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 17, 30, 0).unwrap();
        let filter = Filter::partition_key_eq("o'neil")
            .and(Filter::compare("Count", CompareOp::Ge, 5i64))
            .and(Filter::compare("Timestamp", CompareOp::Lt, when))
            .or(Filter::compare("Owner", CompareOp::Eq, Uuid::nil()));

        assert_eq!(
            filter.to_string(),
            "(((PartitionKey eq 'o''neil') and (Count ge 5L)) and \
             (Timestamp lt datetime'2024-03-01T17:30:00.000000Z')) or \
             (Owner eq guid'00000000-0000-0000-0000-000000000000')"
        );
        assert_eq!(
            Filter::compare("Data", CompareOp::Eq, vec![0x0au8, 0xff]).to_string(),
            "Data eq X'0aff'"
        );
    }

    #[test]
    fn evaluates_against_rows() {
        let row = TableRow::new("ab", "ab12")
            .with_property("Count", 7i32)
            .with_property("Name", "widget");

        assert!(Filter::row_key_eq("ab12").matches(&row));
        assert!(Filter::compare("Count", CompareOp::Gt, 5i64).matches(&row));
        assert!(!Filter::compare("Count", CompareOp::Le, 6i32).matches(&row));
        assert!(Filter::compare("Missing", CompareOp::Ne, "x").matches(&row));
        assert!(
            !Filter::compare("Name", CompareOp::Eq, "widget")
                .and(Filter::partition_key_eq("zz"))
                .matches(&row)
        );
    }
}
