use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{ErrorKind, TableResult};
use crate::store::{BatchOperation, Segment, StorageAccount, TableClient, TableQuery};
use crate::table_error;
use crate::types::{ContinuationToken, TableRow};

/// Failure budget shared by every table of a [`FaultInjectingAccount`].
#[derive(Debug, Default)]
pub struct Faults {
    read_timeouts: AtomicUsize,
    write_timeouts: AtomicUsize,
    failing_writes: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl Faults {
    /// Makes the next `count` segment reads time out.
    pub fn time_out_reads(&self, count: usize) {
        self.read_timeouts.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` writes time out.
    pub fn time_out_writes(&self, count: usize) {
        self.write_timeouts.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail with a non-transient error.
    pub fn reject_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of segment reads attempted so far, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of writes attempted so far, including failed ones.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn on_read(&self) -> TableResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.read_timeouts) {
            return Err(table_error!(ErrorKind::StoreTimeout, "Injected read timeout"));
        }

        Ok(())
    }

    fn on_write(&self) -> TableResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.write_timeouts) {
            return Err(table_error!(ErrorKind::StoreTimeout, "Injected write timeout"));
        }
        if take_one(&self.failing_writes) {
            return Err(table_error!(ErrorKind::StoreRequestFailed, "Injected write failure"));
        }

        Ok(())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Table wrapper failing calls according to its [`Faults`].
#[derive(Debug, Clone)]
pub struct FaultInjectingTable {
    inner: Arc<dyn TableClient>,
    faults: Arc<Faults>,
}

impl FaultInjectingTable {
    pub fn new(inner: Arc<dyn TableClient>, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }
}

#[async_trait]
impl TableClient for FaultInjectingTable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_if_not_exists(&self) -> TableResult<bool> {
        self.inner.create_if_not_exists().await
    }

    async fn create(&self, row: TableRow) -> TableResult<TableRow> {
        self.faults.on_write()?;
        self.inner.create(row).await
    }

    async fn insert_or_replace(&self, row: TableRow) -> TableResult<TableRow> {
        self.faults.on_write()?;
        self.inner.insert_or_replace(row).await
    }

    async fn replace(&self, row: TableRow, etag: &str) -> TableResult<TableRow> {
        self.faults.on_write()?;
        self.inner.replace(row, etag).await
    }

    async fn delete(&self, partition_key: &str, row_key: &str, etag: &str) -> TableResult<()> {
        self.faults.on_write()?;
        self.inner.delete(partition_key, row_key, etag).await
    }

    async fn retrieve(&self, partition_key: &str, row_key: &str) -> TableResult<Option<TableRow>> {
        self.inner.retrieve(partition_key, row_key).await
    }

    async fn query_segment(
        &self,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
    ) -> TableResult<Segment> {
        self.faults.on_read()?;
        self.inner.query_segment(query, continuation).await
    }

    async fn execute_batch(&self, operations: Vec<BatchOperation>) -> TableResult<()> {
        self.faults.on_write()?;
        self.inner.execute_batch(operations).await
    }
}

/// Account wrapper handing out [`FaultInjectingTable`]s that share one [`Faults`].
#[derive(Debug, Clone)]
pub struct FaultInjectingAccount {
    inner: Arc<dyn StorageAccount>,
    faults: Arc<Faults>,
}

impl FaultInjectingAccount {
    pub fn new(inner: Arc<dyn StorageAccount>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn faults(&self) -> &Arc<Faults> {
        &self.faults
    }
}

#[async_trait]
impl StorageAccount for FaultInjectingAccount {
    fn table(&self, name: &str) -> Arc<dyn TableClient> {
        Arc::new(FaultInjectingTable::new(
            self.inner.table(name),
            self.faults.clone(),
        ))
    }

    async fn list_tables(&self) -> TableResult<Vec<String>> {
        self.inner.list_tables().await
    }
}
