//! Backup worker binary.
//!
//! Loads [`BackupWorkerConfig`], connects the control account holding the job records and
//! runs table backups in bounded invocations until they are complete.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::load_config;
use config::shared::BackupWorkerConfig;
use tablestore::backup::{
    BackupRecords, BackupService, BackupWorker, ChannelInvocationQueue, RepositoryBackup,
    ResumeOutcome,
};
use tablestore::store::{MemoryConnector, TableClientPool};
use telemetry::init_tracing;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "backup", about = "Copies table store accounts in resumable invocations")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a backup of every table of one connection into another and run it to completion
    Start {
        /// Connection to copy from
        #[arg(long)]
        source: String,
        /// Connection to copy to
        #[arg(long)]
        destination: String,
        /// Schedule recorded on the job
        #[arg(long, default_value = "0 0 * * *")]
        frequency: String,
    },
    /// Run the next invocation of an existing table backup operation and its continuations
    Resume {
        /// Id of the table backup operation
        #[arg(long)]
        operation: Uuid,
    },
    /// Resume every interrupted table backup and process invocations until interrupted
    Work,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config::<BackupWorkerConfig>().context("loading backup configuration")?;
    config.validate().context("validating backup configuration")?;

    init_tracing(env!("CARGO_BIN_NAME"));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args.command, config))
}

async fn async_main(command: Command, config: BackupWorkerConfig) -> Result<()> {
    let pool = Arc::new(TableClientPool::new().with_connector(MemoryConnector));
    let control = pool
        .named_account(&config.connection_strings, &config.control_connection)
        .await?;
    let records = BackupRecords::open(control.as_ref(), config.repository.clone()).await?;

    let (queue, receiver) = ChannelInvocationQueue::channel();
    let service = Arc::new(BackupService::new(
        records,
        pool,
        config.connection_strings.clone(),
        config.backup.clone(),
        Arc::new(queue),
    ));
    let mut worker = BackupWorker::new(service.clone(), receiver);

    match command {
        Command::Start {
            source,
            destination,
            frequency,
        } => {
            let backup = RepositoryBackup {
                id: Uuid::new_v4(),
                when: Utc::now(),
                frequency,
                source_connection: source,
                destination_connection: destination,
            };
            let invocations = service.start(backup).await?;
            info!(tables = invocations.len(), "backup queued");

            let summary = worker.run_until_idle().await;
            info!(?summary, "backup finished");
        }
        Command::Resume { operation } => match service.resume(operation).await? {
            ResumeOutcome::NotFound => warn!(%operation, "no such backup operation"),
            ResumeOutcome::Complete => info!(%operation, "table backup already complete"),
            ResumeOutcome::Continued(_) => {
                let summary = worker.run_until_idle().await;
                info!(?summary, "table backup finished");
            }
        },
        Command::Work => {
            let invocations = service.requeue_incomplete().await?;
            info!(invocations = invocations.len(), "resuming interrupted table backups");

            let summary = worker
                .run(async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "failed to listen for ctrl-c");
                    }
                })
                .await;
            info!(?summary, "backup worker stopped");
        }
    }

    Ok(())
}
