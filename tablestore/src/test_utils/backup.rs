use std::sync::Arc;

use chrono::Utc;
use config::shared::{BackupConfig, ConnectionStrings, RepositoryConfig};
use uuid::Uuid;

use crate::backup::{
    BackupRecords, BackupService, BackupWorker, ChannelInvocationQueue, RepositoryBackup,
};
use crate::store::{MemoryConnector, MemoryStorageAccount, StorageAccount, TableClientPool};
use crate::test_utils::fault::FaultInjectingAccount;
use crate::types::TableRow;

pub const CONTROL_CONNECTION: &str = "control";
pub const SOURCE_CONNECTION: &str = "source";
pub const DESTINATION_CONNECTION: &str = "destination";

/// Backup service wired to in-memory control, source and destination accounts.
///
/// The source and destination accounts inject faults on demand through
/// [`TestBackup::source`] and [`TestBackup::destination`].
pub struct TestBackup {
    pub control: MemoryStorageAccount,
    pub source_memory: MemoryStorageAccount,
    pub source: FaultInjectingAccount,
    pub destination_memory: MemoryStorageAccount,
    pub destination: FaultInjectingAccount,
    pub service: Arc<BackupService>,
    pub worker: BackupWorker,
}

impl TestBackup {
    pub async fn new(config: BackupConfig) -> Self {
        let control = MemoryStorageAccount::new(CONTROL_CONNECTION);
        let source_memory = MemoryStorageAccount::new(SOURCE_CONNECTION);
        let source = FaultInjectingAccount::new(Arc::new(source_memory.clone()));
        let destination_memory = MemoryStorageAccount::new(DESTINATION_CONNECTION);
        let destination = FaultInjectingAccount::new(Arc::new(destination_memory.clone()));

        let connections = ConnectionStrings::new()
            .with(CONTROL_CONNECTION, "memory://control")
            .with(SOURCE_CONNECTION, "memory://source")
            .with(DESTINATION_CONNECTION, "memory://destination");

        let pool = TableClientPool::new().with_connector(MemoryConnector);
        pool.register("memory://control", Arc::new(control.clone())).await;
        pool.register("memory://source", Arc::new(source.clone())).await;
        pool.register("memory://destination", Arc::new(destination.clone()))
            .await;

        let records = BackupRecords::open(&control, RepositoryConfig::default())
            .await
            .unwrap();
        let (queue, receiver) = ChannelInvocationQueue::channel();
        let service = Arc::new(BackupService::new(
            records,
            Arc::new(pool),
            connections,
            config,
            Arc::new(queue),
        ));
        let worker = BackupWorker::new(service.clone(), receiver);

        Self {
            control,
            source_memory,
            source,
            destination_memory,
            destination,
            service,
            worker,
        }
    }

    /// Fills `table` on the source account with `rows` rows over `partitions` partitions.
    pub async fn seed_source(&self, table: &str, rows: usize, partitions: usize) {
        let client = self.source_memory.table(table);
        client.create_if_not_exists().await.unwrap();

        for i in 0..rows {
            let row = TableRow::new(format!("p{:02}", i % partitions.max(1)), format!("r{i:06}"))
                .with_property("Index", i as i64)
                .with_property("Payload", format!("row {i}"));
            client.insert_or_replace(row).await.unwrap();
        }
    }

    pub fn repository_backup(&self) -> RepositoryBackup {
        RepositoryBackup {
            id: Uuid::new_v4(),
            when: Utc::now(),
            frequency: "0 0 * * *".to_string(),
            source_connection: SOURCE_CONNECTION.to_string(),
            destination_connection: DESTINATION_CONNECTION.to_string(),
        }
    }

    /// Returns `true` when `table` holds the same rows in source and destination.
    pub async fn tables_match(&self, table: &str) -> bool {
        let source = self.source_memory.rows(table).await.unwrap();
        let destination = self.destination_memory.rows(table).await.unwrap();

        source.len() == destination.len()
            && source
                .iter()
                .zip(destination.iter())
                .all(|(a, b)| a.same_content(b))
    }
}
