use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, TableError, TableResult};
use crate::store::{
    BatchOperation, MAX_BATCH_OPERATIONS, Segment, StorageAccount, TableClient, TableQuery,
};
use crate::types::{ANY_ETAG, ContinuationToken, TableRow};
use crate::{bail, table_error};

type RowKeyPair = (String, String);
type TableData = BTreeMap<RowKeyPair, TableRow>;

/// Inner state of [`MemoryStorageAccount`].
#[derive(Debug, Default)]
struct Inner {
    /// Rows of every table, ordered by partition key then row key.
    tables: BTreeMap<String, TableData>,
    /// Source of etags, incremented on every write.
    etag_counter: u64,
}

impl Inner {
    fn table(&self, name: &str) -> TableResult<&TableData> {
        match self.tables.get(name) {
            Some(table) => Ok(table),
            None => bail!(ErrorKind::TableNotFound, "Table does not exist", name.to_string()),
        }
    }

    fn table_mut(&mut self, name: &str) -> TableResult<&mut TableData> {
        match self.tables.get_mut(name) {
            Some(table) => Ok(table),
            None => bail!(ErrorKind::TableNotFound, "Table does not exist", name.to_string()),
        }
    }

    /// Assigns a fresh etag and timestamp, as the server would on every write.
    fn stamp(&mut self, mut row: TableRow) -> TableRow {
        self.etag_counter += 1;
        row.etag = Some(format!("W/\"{}\"", self.etag_counter));
        row.timestamp = Some(Utc::now());
        row
    }
}

fn key_of(row: &TableRow) -> RowKeyPair {
    (row.partition_key.clone(), row.row_key.clone())
}

fn check_etag(stored: &TableRow, etag: &str) -> TableResult<()> {
    if etag == ANY_ETAG || stored.etag.as_deref() == Some(etag) {
        return Ok(());
    }

    bail!(
        ErrorKind::EtagMismatch,
        "Row was modified concurrently",
        format!(
            "row ({}, {}) has etag {:?}, expected {etag}",
            stored.partition_key, stored.row_key, stored.etag
        )
    )
}

fn not_found(partition_key: &str, row_key: &str) -> TableError {
    table_error!(
        ErrorKind::EntityNotFound,
        "Row does not exist",
        format!("row ({partition_key}, {row_key})")
    )
}

/// In-memory storage account.
///
/// Tables are ordered maps keyed by `(partition_key, row_key)`, so queries return rows in
/// the same order a remote table store does. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStorageAccount {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorageAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a concrete client for `name`.
    pub fn memory_table(&self, name: &str) -> MemoryTable {
        MemoryTable {
            name: name.to_string(),
            inner: self.inner.clone(),
        }
    }

    /// Returns every row of `table` in key order.
    pub async fn rows(&self, table: &str) -> TableResult<Vec<TableRow>> {
        let inner = self.inner.lock().await;

        Ok(inner.table(table)?.values().cloned().collect())
    }
}

#[async_trait]
impl StorageAccount for MemoryStorageAccount {
    fn table(&self, name: &str) -> Arc<dyn TableClient> {
        Arc::new(self.memory_table(name))
    }

    async fn list_tables(&self) -> TableResult<Vec<String>> {
        let inner = self.inner.lock().await;

        Ok(inner.tables.keys().cloned().collect())
    }
}

/// Client for one table of a [`MemoryStorageAccount`].
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl TableClient for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_not_exists(&self) -> TableResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.tables.contains_key(&self.name) {
            return Ok(false);
        }

        inner.tables.insert(self.name.clone(), TableData::new());

        Ok(true)
    }

    async fn create(&self, row: TableRow) -> TableResult<TableRow> {
        let mut inner = self.inner.lock().await;
        let key = key_of(&row);
        if inner.table(&self.name)?.contains_key(&key) {
            bail!(
                ErrorKind::EntityAlreadyExists,
                "Row already exists",
                format!("row ({}, {}) in table {}", key.0, key.1, self.name)
            );
        }

        let row = inner.stamp(row);
        inner.table_mut(&self.name)?.insert(key, row.clone());

        Ok(row)
    }

    async fn insert_or_replace(&self, row: TableRow) -> TableResult<TableRow> {
        let mut inner = self.inner.lock().await;
        inner.table(&self.name)?;

        let row = inner.stamp(row);
        inner.table_mut(&self.name)?.insert(key_of(&row), row.clone());

        Ok(row)
    }

    async fn replace(&self, row: TableRow, etag: &str) -> TableResult<TableRow> {
        let mut inner = self.inner.lock().await;
        let key = key_of(&row);
        let stored = inner
            .table(&self.name)?
            .get(&key)
            .ok_or_else(|| not_found(&key.0, &key.1))?;
        check_etag(stored, etag)?;

        let row = inner.stamp(row);
        inner.table_mut(&self.name)?.insert(key, row.clone());

        Ok(row)
    }

    async fn delete(&self, partition_key: &str, row_key: &str, etag: &str) -> TableResult<()> {
        let mut inner = self.inner.lock().await;
        let key = (partition_key.to_string(), row_key.to_string());
        let stored = inner
            .table(&self.name)?
            .get(&key)
            .ok_or_else(|| not_found(partition_key, row_key))?;
        check_etag(stored, etag)?;

        inner.table_mut(&self.name)?.remove(&key);

        Ok(())
    }

    async fn retrieve(&self, partition_key: &str, row_key: &str) -> TableResult<Option<TableRow>> {
        let inner = self.inner.lock().await;
        let key = (partition_key.to_string(), row_key.to_string());

        Ok(inner.table(&self.name)?.get(&key).cloned())
    }

    async fn query_segment(
        &self,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
    ) -> TableResult<Segment> {
        let inner = self.inner.lock().await;
        let table = inner.table(&self.name)?;
        let take = query.segment_size();

        let lower = match continuation {
            Some(token) => Bound::Included((
                token.next_partition_key.clone(),
                token.next_row_key.clone(),
            )),
            None => Bound::Unbounded,
        };

        let mut segment = Segment::default();
        for (key, row) in table.range((lower, Bound::Unbounded)) {
            if segment.rows.len() == take {
                segment.continuation = Some(ContinuationToken::new(key.0.clone(), key.1.clone()));
                break;
            }

            if query.filter.as_ref().is_none_or(|filter| filter.matches(row)) {
                segment.rows.push(row.clone());
            }
        }

        Ok(segment)
    }

    async fn execute_batch(&self, operations: Vec<BatchOperation>) -> TableResult<()> {
        let Some(first) = operations.first() else {
            return Ok(());
        };

        if operations.len() > MAX_BATCH_OPERATIONS {
            bail!(
                ErrorKind::BatchLimitExceeded,
                "Batch contains too many operations",
                format!("{} operations, at most {MAX_BATCH_OPERATIONS}", operations.len())
            );
        }

        let partition_key = first.partition_key().to_string();
        let mut seen = HashSet::with_capacity(operations.len());
        for operation in &operations {
            if operation.partition_key() != partition_key {
                bail!(
                    ErrorKind::BatchLimitExceeded,
                    "Batch spans more than one partition",
                    format!("{partition_key} and {}", operation.partition_key())
                );
            }
            if !seen.insert(operation.row_key().to_string()) {
                bail!(
                    ErrorKind::StoreRequestFailed,
                    "Batch touches the same row twice",
                    format!("row ({partition_key}, {})", operation.row_key())
                );
            }
        }

        let mut inner = self.inner.lock().await;

        // Check every precondition before applying anything so the batch stays atomic.
        let table = inner.table(&self.name)?;
        for operation in &operations {
            let key = (partition_key.clone(), operation.row_key().to_string());
            match operation {
                BatchOperation::Insert(_) if table.contains_key(&key) => bail!(
                    ErrorKind::EntityAlreadyExists,
                    "Row already exists",
                    format!("row ({}, {}) in table {}", key.0, key.1, self.name)
                ),
                BatchOperation::Replace(row) => {
                    let stored = table.get(&key).ok_or_else(|| not_found(&key.0, &key.1))?;
                    check_etag(stored, row.etag.as_deref().unwrap_or(ANY_ETAG))?;
                }
                BatchOperation::Delete { etag, .. } => {
                    let stored = table.get(&key).ok_or_else(|| not_found(&key.0, &key.1))?;
                    check_etag(stored, etag)?;
                }
                _ => {}
            }
        }

        for operation in operations {
            match operation {
                BatchOperation::Insert(row)
                | BatchOperation::InsertOrReplace(row)
                | BatchOperation::Replace(row) => {
                    let row = inner.stamp(row);
                    inner.table_mut(&self.name)?.insert(key_of(&row), row);
                }
                BatchOperation::Delete {
                    partition_key,
                    row_key,
                    ..
                } => {
                    inner.table_mut(&self.name)?.remove(&(partition_key, row_key));
                }
            }
        }

        Ok(())
    }
}
