use std::collections::BTreeMap;
use std::sync::Arc;

use config::shared::BackupConfig;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::bail;
use crate::concurrency::backoff::{LinearBackoff, retry_on_timeout};
use crate::error::{ErrorKind, TableResult};
use crate::store::{BatchOperation, TableClient, TableQuery};
use crate::types::{ContinuationToken, TableRow};

/// Upper bound of rows the writer drains from the channel at once.
const WRITER_DRAIN_LIMIT: usize = 1000;

/// Result of one bounded copy invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyProgress {
    /// Where the next invocation resumes; `None` once the source is exhausted.
    pub continuation: Option<ContinuationToken>,
    pub rows_copied: u64,
}

impl CopyProgress {
    pub fn is_complete(&self) -> bool {
        self.continuation.is_none()
    }
}

/// Copies rows from `source` to `destination` starting at `start`.
///
/// Segments are read sequentially and handed to a writer task that upserts them in
/// single-partition batches. Reading stops once the source is exhausted or, checked at
/// segment boundaries, once the duration or row budget of `config` is spent. The writer
/// is always drained before returning, so every row counted in the returned progress is
/// in the destination.
pub async fn copy_table(
    source: Arc<dyn TableClient>,
    destination: Arc<dyn TableClient>,
    start: Option<ContinuationToken>,
    config: &BackupConfig,
) -> TableResult<CopyProgress> {
    let started = Instant::now();
    let mut backoff = LinearBackoff::from_config(config);

    retry_on_timeout("create_if_not_exists", &mut backoff, || {
        destination.create_if_not_exists()
    })
    .await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_rows(
        destination.clone(),
        rx,
        config.batch_size,
        LinearBackoff::from_config(config),
    ));

    let query = TableQuery::all().with_take(config.segment_size);
    let max_duration = config.max_duration();
    let mut continuation = start;
    let mut rows_read = 0u64;
    let mut read_result = Ok(());

    loop {
        let segment = match retry_on_timeout("query_segment", &mut backoff, || {
            source.query_segment(&query, continuation.as_ref())
        })
        .await
        {
            Ok(segment) => segment,
            Err(err) => {
                read_result = Err(err);
                break;
            }
        };

        let segment_rows = segment.rows.len() as u64;
        // The writer only stops early on failure, whose error is picked up below.
        if segment.rows.into_iter().any(|row| tx.send(row).is_err()) {
            break;
        }

        rows_read += segment_rows;
        continuation = segment.continuation;

        debug!(
            table = source.name(),
            segment_rows,
            rows_read,
            "read table segment"
        );

        if continuation.is_none() {
            break;
        }

        if started.elapsed() >= max_duration || rows_read >= config.max_rows {
            info!(
                table = source.name(),
                rows_read,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "copy budget spent, yielding"
            );
            break;
        }
    }

    drop(tx);

    let rows_written = match writer.await {
        Ok(result) => result?,
        Err(err) => {
            bail!(
                ErrorKind::BackupWriterPanic,
                "Backup writer task failed",
                err
            );
        }
    };
    read_result?;

    info!(
        table = source.name(),
        rows_written,
        complete = continuation.is_none(),
        "completed table copy invocation"
    );

    Ok(CopyProgress {
        continuation,
        rows_copied: rows_written,
    })
}

/// Drains rows from `rx` and upserts them grouped by partition key.
async fn write_rows(
    destination: Arc<dyn TableClient>,
    mut rx: mpsc::UnboundedReceiver<TableRow>,
    batch_size: usize,
    mut backoff: LinearBackoff,
) -> TableResult<u64> {
    let mut buffer = Vec::with_capacity(WRITER_DRAIN_LIMIT);
    let mut written = 0u64;

    while rx.recv_many(&mut buffer, WRITER_DRAIN_LIMIT).await > 0 {
        let mut partitions: BTreeMap<String, Vec<TableRow>> = BTreeMap::new();
        for row in buffer.drain(..) {
            partitions
                .entry(row.partition_key.clone())
                .or_default()
                .push(row);
        }

        for rows in partitions.into_values() {
            for chunk in rows.chunks(batch_size.max(1)) {
                let operations: Vec<_> = chunk
                    .iter()
                    .cloned()
                    .map(BatchOperation::InsertOrReplace)
                    .collect();

                retry_on_timeout("execute_batch", &mut backoff, || {
                    destination.execute_batch(operations.clone())
                })
                .await?;

                written += chunk.len() as u64;
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{MemoryStorageAccount, StorageAccount};
    use crate::types::Value;

    fn row(partition_key: &str, row_key: &str) -> TableRow {
        let mut row = TableRow::new(partition_key, row_key);
        row.properties
            .insert("Name".into(), Value::String(format!("{partition_key}/{row_key}")));
        row
    }

    async fn seeded_source(rows: usize) -> (MemoryStorageAccount, Arc<dyn TableClient>) {
        let account = MemoryStorageAccount::new("source");
        let table = account.table("items");
        table.create_if_not_exists().await.unwrap();
        for i in 0..rows {
            table
                .insert_or_replace(row(&format!("p{}", i % 3), &format!("r{i:04}")))
                .await
                .unwrap();
        }

        (account, table)
    }

    fn config(max_rows: u64, segment_size: usize) -> BackupConfig {
        BackupConfig {
            max_rows,
            segment_size,
            batch_size: 10,
            ..BackupConfig::default()
        }
    }

    #[tokio::test]
    async fn copies_whole_table_when_budget_allows() {
        let (_source_account, source) = seeded_source(25).await;
        let destination_account = MemoryStorageAccount::new("destination");
        let destination = destination_account.table("items");

        let progress = copy_table(source, destination, None, &config(1_000, 7))
            .await
            .unwrap();

        assert!(progress.is_complete());
        assert_eq!(progress.rows_copied, 25);
        assert_eq!(destination_account.rows("items").await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn yields_at_segment_boundary_once_row_budget_is_spent() {
        let (_source_account, source) = seeded_source(25).await;
        let destination_account = MemoryStorageAccount::new("destination");
        let destination = destination_account.table("items");

        let first = copy_table(source.clone(), destination.clone(), None, &config(8, 5))
            .await
            .unwrap();
        assert_eq!(first.rows_copied, 10);
        assert!(!first.is_complete());

        let second = copy_table(source, destination, first.continuation, &config(1_000, 5))
            .await
            .unwrap();
        assert_eq!(second.rows_copied, 15);
        assert!(second.is_complete());
        assert_eq!(destination_account.rows("items").await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn zero_duration_budget_still_copies_one_segment() {
        let (_source_account, source) = seeded_source(12).await;
        let destination_account = MemoryStorageAccount::new("destination");
        let config = BackupConfig {
            max_duration_ms: 0,
            ..config(1_000, 4)
        };

        let progress = copy_table(source, destination_account.table("items"), None, &config)
            .await
            .unwrap();

        assert_eq!(progress.rows_copied, 4);
        assert!(!progress.is_complete());
        assert_eq!(config.max_duration(), Duration::ZERO);
    }
}
