use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use config::shared::RepositoryConfig;
use uuid::Uuid;

use crate::entity::{EntityDescriptor, Member};
use crate::error::TableResult;
use crate::keys::{DirectKey, RowKeyPrefix};
use crate::repository::EntityRepository;
use crate::store::StorageAccount;
use crate::types::MemberType;

pub const REPOSITORY_BACKUPS_TABLE: &str = "RepositoryBackups";
pub const TABLE_BACKUPS_TABLE: &str = "TableBackups";
pub const OPERATIONS_TABLE: &str = "TableBackupOperations";

/// A backup job copying every table of one account to another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryBackup {
    pub id: Uuid,
    pub when: DateTime<Utc>,
    /// Cron-like schedule the job was created for.
    pub frequency: String,
    /// Name of the configured connection to copy from.
    pub source_connection: String,
    /// Name of the configured connection to copy to.
    pub destination_connection: String,
}

/// Progress of copying one table as part of a [`RepositoryBackup`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableBackup {
    pub id: Uuid,
    pub backup: Uuid,
    pub table_name: String,
    /// Encoded continuation token; empty before the first invocation and after the last.
    pub continuation_token: String,
    pub rows_copied: i64,
    pub etags_blob_id: Option<Uuid>,
    pub when: DateTime<Utc>,
    pub when_completed: Option<DateTime<Utc>>,
}

impl TableBackup {
    pub fn is_complete(&self) -> bool {
        self.when_completed.is_some()
    }
}

/// The handle a continuation invocation refers to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableBackupOperation {
    pub id: Uuid,
    pub table_backup: Uuid,
    pub backup: Uuid,
    pub when: DateTime<Utc>,
}

static REPOSITORY_BACKUP: LazyLock<TableResult<Arc<EntityDescriptor<RepositoryBackup>>>> =
    LazyLock::new(|| {
        EntityDescriptor::builder("RepositoryBackup")
            .member(
                Member::field("id", MemberType::Guid, |b: &RepositoryBackup| b.id, |b, v| b.id = v)
                    .row_key(DirectKey)
                    .partition_key(RowKeyPrefix::default()),
            )
            .member(
                Member::field("when", MemberType::DateTime, |b: &RepositoryBackup| b.when, |b, v| b.when = v)
                    .property_named("When"),
            )
            .member(
                Member::field(
                    "frequency",
                    MemberType::String,
                    |b: &RepositoryBackup| b.frequency.clone(),
                    |b, v| b.frequency = v,
                )
                .property_named("Frequency"),
            )
            .member(
                Member::field(
                    "source_connection",
                    MemberType::String,
                    |b: &RepositoryBackup| b.source_connection.clone(),
                    |b, v| b.source_connection = v,
                )
                .property_named("SourceConnection"),
            )
            .member(
                Member::field(
                    "destination_connection",
                    MemberType::String,
                    |b: &RepositoryBackup| b.destination_connection.clone(),
                    |b, v| b.destination_connection = v,
                )
                .property_named("DestinationConnection"),
            )
            .build()
            .map(Arc::new)
    });

static TABLE_BACKUP: LazyLock<TableResult<Arc<EntityDescriptor<TableBackup>>>> =
    LazyLock::new(|| {
        EntityDescriptor::builder("TableBackup")
            .member(
                Member::field("id", MemberType::Guid, |b: &TableBackup| b.id, |b, v| b.id = v)
                    .row_key(DirectKey)
                    .partition_key(RowKeyPrefix::default()),
            )
            .member(
                Member::field("backup", MemberType::Reference, |b: &TableBackup| b.backup, |b, v| b.backup = v)
                    .property_named("Backup"),
            )
            .member(
                Member::field(
                    "table_name",
                    MemberType::String,
                    |b: &TableBackup| b.table_name.clone(),
                    |b, v| b.table_name = v,
                )
                .property_named("TableName"),
            )
            .member(
                Member::field(
                    "continuation_token",
                    MemberType::String,
                    |b: &TableBackup| b.continuation_token.clone(),
                    |b, v| b.continuation_token = v,
                )
                .stored_as(crate::codec::OverflowPropertyCodec::named("ContinuationToken")),
            )
            .member(
                Member::field("rows_copied", MemberType::Int64, |b: &TableBackup| b.rows_copied, |b, v| b.rows_copied = v)
                    .property_named("RowsCopied"),
            )
            .member(
                Member::optional_field(
                    "etags_blob_id",
                    MemberType::OptionalReference,
                    |b: &TableBackup| b.etags_blob_id,
                    |b, v| b.etags_blob_id = v,
                )
                .property_named("EtagsBlobId"),
            )
            .member(
                Member::field("when", MemberType::DateTime, |b: &TableBackup| b.when, |b, v| b.when = v)
                    .property_named("When"),
            )
            .member(
                Member::optional_field(
                    "when_completed",
                    MemberType::DateTime,
                    |b: &TableBackup| b.when_completed,
                    |b, v| b.when_completed = v,
                )
                .property_named("WhenCompleted"),
            )
            .build()
            .map(Arc::new)
    });

static TABLE_BACKUP_OPERATION: LazyLock<TableResult<Arc<EntityDescriptor<TableBackupOperation>>>> =
    LazyLock::new(|| {
        EntityDescriptor::builder("TableBackupOperation")
            .member(
                Member::field("id", MemberType::Guid, |o: &TableBackupOperation| o.id, |o, v| o.id = v)
                    .row_key(DirectKey)
                    .partition_key(RowKeyPrefix::default()),
            )
            .member(
                Member::field(
                    "table_backup",
                    MemberType::Reference,
                    |o: &TableBackupOperation| o.table_backup,
                    |o, v| o.table_backup = v,
                )
                .property_named("TableBackup"),
            )
            .member(
                Member::field(
                    "backup",
                    MemberType::Reference,
                    |o: &TableBackupOperation| o.backup,
                    |o, v| o.backup = v,
                )
                .property_named("Backup"),
            )
            .member(
                Member::field("when", MemberType::DateTime, |o: &TableBackupOperation| o.when, |o, v| o.when = v)
                    .property_named("When"),
            )
            .build()
            .map(Arc::new)
    });

pub fn repository_backup_descriptor() -> TableResult<Arc<EntityDescriptor<RepositoryBackup>>> {
    REPOSITORY_BACKUP.clone()
}

pub fn table_backup_descriptor() -> TableResult<Arc<EntityDescriptor<TableBackup>>> {
    TABLE_BACKUP.clone()
}

pub fn table_backup_operation_descriptor()
-> TableResult<Arc<EntityDescriptor<TableBackupOperation>>> {
    TABLE_BACKUP_OPERATION.clone()
}

/// Repositories for the job records, all on the control account.
#[derive(Debug, Clone)]
pub struct BackupRecords {
    pub backups: EntityRepository<RepositoryBackup>,
    pub table_backups: EntityRepository<TableBackup>,
    pub operations: EntityRepository<TableBackupOperation>,
}

impl BackupRecords {
    /// Opens the record tables on `account`, creating them if needed.
    pub async fn open(account: &dyn StorageAccount, config: RepositoryConfig) -> TableResult<Self> {
        let records = Self {
            backups: EntityRepository::new(
                repository_backup_descriptor()?,
                account.table(REPOSITORY_BACKUPS_TABLE),
                config.clone(),
            ),
            table_backups: EntityRepository::new(
                table_backup_descriptor()?,
                account.table(TABLE_BACKUPS_TABLE),
                config.clone(),
            ),
            operations: EntityRepository::new(
                table_backup_operation_descriptor()?,
                account.table(OPERATIONS_TABLE),
                config,
            ),
        };

        records.backups.ensure_table().await?;
        records.table_backups.ensure_table().await?;
        records.operations.ensure_table().await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TableEntity;

    #[test]
    fn record_descriptors_are_valid() {
        assert!(repository_backup_descriptor().is_ok());
        assert!(table_backup_operation_descriptor().is_ok());

        let table_backup = TableBackup {
            id: Uuid::from_u128(0x1234),
            backup: Uuid::from_u128(0x99),
            table_name: "Products".into(),
            rows_copied: 150_000,
            ..Default::default()
        };
        let descriptor = table_backup_descriptor().unwrap();
        let row = TableEntity::new(descriptor.clone(), table_backup.clone())
            .write_entity()
            .unwrap();

        assert_eq!(row.partition_key, "00");
        assert!(!row.properties.contains_key("EtagsBlobId"));
        assert_eq!(
            TableEntity::read_entity(descriptor, &row).unwrap().into_inner(),
            table_backup
        );
    }
}
