use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::Value;

/// ETag that makes replace and delete unconditional.
pub const ANY_ETAG: &str = "*";

/// Named properties of a stored row, ordered by name.
pub type PropertyBag = BTreeMap<String, Value>;

/// A row as laid out in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    /// Server-assigned modification time, absent until the row has been written.
    pub timestamp: Option<DateTime<Utc>>,
    /// Concurrency token, absent until the row has been written.
    pub etag: Option<String>,
    pub properties: PropertyBag,
}

impl TableRow {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: None,
            etag: None,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.partition_key, &self.row_key)
    }

    /// Returns a system or user property by name, as seen by store filters.
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "PartitionKey" => Some(Value::String(self.partition_key.clone())),
            "RowKey" => Some(Value::String(self.row_key.clone())),
            "Timestamp" => self.timestamp.map(Value::DateTime),
            _ => self.properties.get(name).cloned(),
        }
    }

    /// Returns `true` when both rows hold the same key and properties, ignoring server metadata.
    pub fn same_content(&self, other: &TableRow) -> bool {
        self.partition_key == other.partition_key
            && self.row_key == other.row_key
            && self.properties == other.properties
    }
}
