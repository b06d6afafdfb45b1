use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use config::shared::{BackupConfig, ConnectionStrings};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backup::copy::copy_table;
use crate::backup::queue::{BackupInvocation, InvocationQueue};
use crate::backup::records::{BackupRecords, RepositoryBackup, TableBackup, TableBackupOperation};
use crate::error::{ErrorKind, TableResult};
use crate::entity::Entity;
use crate::repository::{CreateOutcome, EntityRepository, UpdateOutcome};
use crate::store::TableClientPool;
use crate::types::ContinuationToken;
use crate::{bail, table_error};

/// Result of one [`BackupService::resume`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Progress was persisted and another invocation was queued.
    Continued(BackupInvocation),
    /// The table is fully copied.
    Complete,
    /// The operation or one of the records it refers to does not exist.
    NotFound,
}

/// Starts backup jobs and runs their bounded copy invocations.
#[derive(Debug)]
pub struct BackupService {
    records: BackupRecords,
    pool: Arc<TableClientPool>,
    connections: ConnectionStrings,
    config: BackupConfig,
    queue: Arc<dyn InvocationQueue>,
}

impl BackupService {
    pub fn new(
        records: BackupRecords,
        pool: Arc<TableClientPool>,
        connections: ConnectionStrings,
        config: BackupConfig,
        queue: Arc<dyn InvocationQueue>,
    ) -> Self {
        Self {
            records,
            pool,
            connections,
            config,
            queue,
        }
    }

    pub fn records(&self) -> &BackupRecords {
        &self.records
    }

    /// Records `backup` and queues the first invocation for every table of its source.
    ///
    /// The job record is written after its table records, so a start that fails midway
    /// leaves no job behind and can be repeated with the same id.
    pub async fn start(&self, backup: RepositoryBackup) -> TableResult<Vec<BackupInvocation>> {
        if self.records.backups.get_by_id(backup.id).await?.is_some() {
            bail!(
                ErrorKind::EntityAlreadyExists,
                "Backup was already started",
                backup.id
            );
        }

        let source = self
            .pool
            .named_account(&self.connections, &backup.source_connection)
            .await?;
        let tables = source.list_tables().await?;

        let mut invocations = Vec::with_capacity(tables.len());
        for table_name in tables {
            let now = Utc::now();
            let table_backup = TableBackup {
                id: Uuid::new_v4(),
                backup: backup.id,
                table_name,
                when: now,
                ..TableBackup::default()
            };
            let operation = TableBackupOperation {
                id: Uuid::new_v4(),
                table_backup: table_backup.id,
                backup: backup.id,
                when: now,
            };

            self.create_record(&self.records.table_backups, table_backup).await?;
            self.create_record(&self.records.operations, operation.clone()).await?;

            invocations.push(BackupInvocation {
                operation_id: operation.id,
            });
        }

        match self.records.backups.create(backup.clone()).await? {
            CreateOutcome::Created(_) => {}
            CreateOutcome::AlreadyExists => {
                bail!(
                    ErrorKind::EntityAlreadyExists,
                    "Backup was already started",
                    backup.id
                );
            }
            CreateOutcome::ModifierFailed(failure) => {
                bail!(ErrorKind::ModifierFailed, "Backup could not be recorded", failure);
            }
        }

        for invocation in &invocations {
            self.queue.enqueue(*invocation).await?;
        }

        info!(
            backup_id = %backup.id,
            source = backup.source_connection,
            destination = backup.destination_connection,
            tables = invocations.len(),
            "started repository backup"
        );

        Ok(invocations)
    }

    /// Queues one invocation for every table backup that is not complete yet.
    ///
    /// Each table backup is resumed through its most recent operation. Table backups whose
    /// job was never recorded are skipped.
    pub async fn requeue_incomplete(&self) -> TableResult<Vec<BackupInvocation>> {
        let pending: Vec<TableBackup> = self
            .records
            .table_backups
            .get_all()
            .await?
            .into_iter()
            .filter(|record| !record.is_complete())
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut latest: HashMap<Uuid, TableBackupOperation> = HashMap::new();
        for operation in self.records.operations.get_all().await? {
            match latest.get(&operation.table_backup) {
                Some(current) if current.when >= operation.when => {}
                _ => {
                    latest.insert(operation.table_backup, operation);
                }
            }
        }

        let mut invocations = Vec::with_capacity(pending.len());
        for table_backup in pending {
            if self.records.backups.get_by_id(table_backup.backup).await?.is_none() {
                warn!(
                    table_backup_id = %table_backup.id,
                    backup_id = %table_backup.backup,
                    "skipping table backup of an unrecorded job"
                );
                continue;
            }

            let operation_id = match latest.remove(&table_backup.id) {
                Some(operation) => operation.id,
                None => {
                    let operation = TableBackupOperation {
                        id: Uuid::new_v4(),
                        table_backup: table_backup.id,
                        backup: table_backup.backup,
                        when: Utc::now(),
                    };
                    self.create_record(&self.records.operations, operation.clone())
                        .await?;
                    operation.id
                }
            };

            let invocation = BackupInvocation { operation_id };
            self.queue.enqueue(invocation).await?;
            invocations.push(invocation);
        }

        info!(invocations = invocations.len(), "requeued incomplete table backups");

        Ok(invocations)
    }

    /// Runs one bounded copy invocation of the operation `operation_id`.
    ///
    /// The continuation token and the cumulative row count are persisted in a single
    /// update, so a crash before the update repeats the invocation from the previous token.
    pub async fn resume(&self, operation_id: Uuid) -> TableResult<ResumeOutcome> {
        let Some(operation) = self.records.operations.get_by_id(operation_id).await? else {
            warn!(%operation_id, "backup operation not found");
            return Ok(ResumeOutcome::NotFound);
        };
        let Some(table_backup) = self
            .records
            .table_backups
            .get_by_id(operation.table_backup)
            .await?
        else {
            warn!(%operation_id, table_backup_id = %operation.table_backup, "table backup not found");
            return Ok(ResumeOutcome::NotFound);
        };
        if table_backup.is_complete() {
            return Ok(ResumeOutcome::Complete);
        }
        let Some(backup) = self.records.backups.get_by_id(operation.backup).await? else {
            warn!(%operation_id, backup_id = %operation.backup, "repository backup not found");
            return Ok(ResumeOutcome::NotFound);
        };

        let source = self
            .pool
            .table(&self.connections, &backup.source_connection, &table_backup.table_name)
            .await?;
        let destination = self
            .pool
            .table(
                &self.connections,
                &backup.destination_connection,
                &table_backup.table_name,
            )
            .await?;

        let start = ContinuationToken::decode_optional(&table_backup.continuation_token)?;
        let progress = copy_table(source, destination, start, &self.config).await?;

        #[cfg(feature = "failpoints")]
        crate::failpoints::table_fail_point(crate::failpoints::BACKUP_BEFORE_PROGRESS_PERSIST)?;

        let token = ContinuationToken::encode_optional(progress.continuation.as_ref())?;
        let complete = progress.is_complete();
        let rows = progress.rows_copied as i64;

        let updated = match self
            .records
            .table_backups
            .update(table_backup.id, |record| {
                record.continuation_token = token.clone();
                record.rows_copied += rows;
                if complete {
                    record.when_completed = Some(Utc::now());
                }
            })
            .await?
        {
            UpdateOutcome::Updated(record) => record,
            UpdateOutcome::NotFound => return Ok(ResumeOutcome::NotFound),
            UpdateOutcome::ModifierFailed(failure) => {
                bail!(ErrorKind::ModifierFailed, "Backup progress could not be saved", failure);
            }
        };

        info!(
            %operation_id,
            table = updated.table_name,
            rows_copied = updated.rows_copied,
            complete,
            "persisted table backup progress"
        );

        if complete {
            return Ok(ResumeOutcome::Complete);
        }

        let invocation = BackupInvocation { operation_id };
        self.queue.enqueue(invocation).await?;

        Ok(ResumeOutcome::Continued(invocation))
    }

    async fn create_record<T>(
        &self,
        repository: &EntityRepository<T>,
        record: T,
    ) -> TableResult<()>
    where
        T: Entity + Default + Clone,
    {
        match repository.create(record).await? {
            CreateOutcome::Created(_) => Ok(()),
            CreateOutcome::AlreadyExists => Err(table_error!(
                ErrorKind::EntityAlreadyExists,
                "Backup record already exists",
                repository.descriptor().type_name()
            )),
            CreateOutcome::ModifierFailed(failure) => Err(table_error!(
                ErrorKind::ModifierFailed,
                "Backup record could not be saved",
                failure
            )),
        }
    }
}
