//! Incremental table backup.
//!
//! A [`RepositoryBackup`] job copies every table of a source account to a destination
//! account. Each table is copied by [`copy_table`] in invocations bounded by a wall-clock
//! and a row budget; the continuation token persisted on the [`TableBackup`] record is the
//! resume point of the next invocation, which is requested through an [`InvocationQueue`].

mod copy;
mod queue;
mod records;
mod service;
mod worker;

pub use copy::{CopyProgress, copy_table};
pub use queue::{BackupInvocation, ChannelInvocationQueue, InvocationQueue, InvocationReceiver};
pub use records::{
    BackupRecords, OPERATIONS_TABLE, REPOSITORY_BACKUPS_TABLE, RepositoryBackup,
    TABLE_BACKUPS_TABLE, TableBackup, TableBackupOperation, repository_backup_descriptor,
    table_backup_descriptor, table_backup_operation_descriptor,
};
pub use service::{BackupService, ResumeOutcome};
pub use worker::{BackupWorker, WorkerSummary};
