use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TableResult;
use crate::query::Filter;
use crate::types::{ContinuationToken, TableRow};

/// Most operations a single batch may contain.
pub const MAX_BATCH_OPERATIONS: usize = 100;

/// Rows returned per query segment unless the query asks for fewer.
pub const DEFAULT_SEGMENT_SIZE: usize = 1000;

/// A filtered, segmented scan over a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableQuery {
    pub filter: Option<Filter>,
    /// Maximum number of rows per segment.
    pub take: Option<usize>,
}

impl TableQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Option<Filter>) -> Self {
        Self { filter, take: None }
    }

    pub fn with_take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn segment_size(&self) -> usize {
        self.take.unwrap_or(DEFAULT_SEGMENT_SIZE).max(1)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub rows: Vec<TableRow>,
    /// Where the next segment starts, or [`None`] once the scan is complete.
    pub continuation: Option<ContinuationToken>,
}

/// A write that is part of an atomic batch.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Insert(TableRow),
    InsertOrReplace(TableRow),
    Replace(TableRow),
    Delete {
        partition_key: String,
        row_key: String,
        etag: String,
    },
}

impl BatchOperation {
    pub fn partition_key(&self) -> &str {
        match self {
            BatchOperation::Insert(row)
            | BatchOperation::InsertOrReplace(row)
            | BatchOperation::Replace(row) => &row.partition_key,
            BatchOperation::Delete { partition_key, .. } => partition_key,
        }
    }

    pub fn row_key(&self) -> &str {
        match self {
            BatchOperation::Insert(row)
            | BatchOperation::InsertOrReplace(row)
            | BatchOperation::Replace(row) => &row.row_key,
            BatchOperation::Delete { row_key, .. } => row_key,
        }
    }
}

/// Operations on a single table.
///
/// Writes return the row as stored, with the server-assigned timestamp and etag.
#[async_trait]
pub trait TableClient: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Creates the table, returning `true` if it did not exist before.
    async fn create_if_not_exists(&self) -> TableResult<bool>;

    /// Inserts a new row, failing with `EntityAlreadyExists` if the key is taken.
    async fn create(&self, row: TableRow) -> TableResult<TableRow>;

    async fn insert_or_replace(&self, row: TableRow) -> TableResult<TableRow>;

    /// Replaces an existing row if its etag still matches. `*` matches any etag.
    async fn replace(&self, row: TableRow, etag: &str) -> TableResult<TableRow>;

    /// Deletes an existing row if its etag still matches. `*` matches any etag.
    async fn delete(&self, partition_key: &str, row_key: &str, etag: &str) -> TableResult<()>;

    async fn retrieve(&self, partition_key: &str, row_key: &str) -> TableResult<Option<TableRow>>;

    /// Reads the segment of matching rows starting at `continuation`.
    async fn query_segment(
        &self,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
    ) -> TableResult<Segment>;

    /// Applies all operations atomically. They must target one partition and be at most
    /// [`MAX_BATCH_OPERATIONS`].
    async fn execute_batch(&self, operations: Vec<BatchOperation>) -> TableResult<()>;
}

/// A storage account holding named tables.
#[async_trait]
pub trait StorageAccount: fmt::Debug + Send + Sync {
    /// Returns a client for `name`. The table itself may not exist yet.
    fn table(&self, name: &str) -> Arc<dyn TableClient>;

    async fn list_tables(&self) -> TableResult<Vec<String>>;
}
