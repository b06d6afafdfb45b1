use std::time::Duration;

use config::shared::BackupConfig;
use telemetry::init_test_tracing;
use tokio::sync::oneshot;
use uuid::Uuid;

use tablestore::backup::{RepositoryBackup, ResumeOutcome, TableBackup};
use tablestore::error::ErrorKind;
use tablestore::test_utils::backup::TestBackup;

fn small_budget() -> BackupConfig {
    BackupConfig {
        max_rows: 40,
        segment_size: 10,
        batch_size: 7,
        retry_initial_delay_ms: 1,
        retry_delay_increment_ms: 1,
        ..BackupConfig::default()
    }
}

async fn table_backups(backup: &TestBackup) -> Vec<TableBackup> {
    let mut records = backup
        .service
        .records()
        .table_backups
        .get_all()
        .await
        .unwrap();
    records.sort_by(|a, b| a.table_name.cmp(&b.table_name));
    records
}

#[tokio::test(flavor = "multi_thread")]
async fn backup_copies_every_table_in_bounded_invocations() {
    init_test_tracing();
    let mut backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 95, 4).await;
    backup.seed_source("orders", 30, 3).await;

    let invocations = backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    assert_eq!(invocations.len(), 2);

    let summary = backup.worker.run_until_idle().await;
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.continued, 2);
    assert_eq!(summary.failed, 0);

    assert!(backup.tables_match("products").await);
    assert!(backup.tables_match("orders").await);

    let records = table_backups(&backup).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].table_name, "orders");
    assert_eq!(records[0].rows_copied, 30);
    assert_eq!(records[1].table_name, "products");
    assert_eq!(records[1].rows_copied, 95);
    for record in &records {
        assert!(record.is_complete());
        assert!(record.continuation_token.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn repeating_an_invocation_does_not_duplicate_rows() {
    init_test_tracing();
    let mut backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 60, 5).await;

    let invocations = backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    let operation_id = invocations[0].operation_id;

    // Run the first invocation by hand, then pretend its progress was never saved.
    let _ = backup.worker.run_until_idle().await;
    let record = table_backups(&backup).await.remove(0);
    backup
        .service
        .records()
        .table_backups
        .update(record.id, |record| {
            record.continuation_token.clear();
            record.rows_copied = 0;
            record.when_completed = None;
        })
        .await
        .unwrap();

    let outcome = backup.service.resume(operation_id).await.unwrap();
    assert!(matches!(outcome, ResumeOutcome::Continued(_)));
    let _ = backup.worker.run_until_idle().await;

    assert!(backup.tables_match("products").await);
    assert_eq!(table_backups(&backup).await[0].rows_copied, 60);
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_reads_are_retried() {
    init_test_tracing();
    let mut backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 25, 2).await;
    backup.source.faults().time_out_reads(3);

    backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    let summary = backup.worker.run_until_idle().await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    // Three segments plus the three injected timeouts.
    assert_eq!(backup.source.faults().reads(), 6);
    assert!(backup.tables_match("products").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_writes_are_retried() {
    init_test_tracing();
    let config = BackupConfig {
        batch_size: 10,
        ..small_budget()
    };
    let mut backup = TestBackup::new(config).await;
    backup.seed_source("products", 10, 1).await;
    backup.destination.faults().time_out_writes(3);

    backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    let summary = backup.worker.run_until_idle().await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    // One batch plus the three injected timeouts.
    assert_eq!(backup.destination.faults().writes(), 4);
    assert!(backup.tables_match("products").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_invocations_are_requeued_from_the_records() {
    init_test_tracing();
    let mut backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 25, 1).await;
    backup.destination.faults().reject_writes(1);

    let invocations = backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    let summary = backup.worker.run_until_idle().await;
    assert_eq!(summary.failed, 1);
    assert!(!table_backups(&backup).await[0].is_complete());

    let requeued = backup.service.requeue_incomplete().await.unwrap();
    assert_eq!(requeued, invocations);

    let summary = backup.worker.run_until_idle().await;
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    assert!(backup.tables_match("products").await);
    assert!(backup.service.requeue_incomplete().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_start_can_be_repeated() {
    init_test_tracing();
    let mut backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 5, 1).await;

    let job = backup.repository_backup();
    let broken = RepositoryBackup {
        source_connection: "missing".to_string(),
        ..job.clone()
    };
    let error = backup.service.start(broken).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConfigError);
    assert!(
        backup
            .service
            .records()
            .backups
            .get_by_id(job.id)
            .await
            .unwrap()
            .is_none()
    );

    let invocations = backup.service.start(job.clone()).await.unwrap();
    assert_eq!(invocations.len(), 1);
    let summary = backup.worker.run_until_idle().await;
    assert_eq!(summary.completed, 1);
    assert!(backup.tables_match("products").await);

    let error = backup.service.start(job).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::EntityAlreadyExists);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_reports_unknown_and_finished_operations() {
    init_test_tracing();
    let mut backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 5, 1).await;

    assert_eq!(
        backup.service.resume(Uuid::new_v4()).await.unwrap(),
        ResumeOutcome::NotFound
    );

    let invocations = backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    let _ = backup.worker.run_until_idle().await;

    assert_eq!(
        backup.service.resume(invocations[0].operation_id).await.unwrap(),
        ResumeOutcome::Complete
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_runs_until_shutdown() {
    init_test_tracing();
    let backup = TestBackup::new(small_budget()).await;
    backup.seed_source("products", 90, 3).await;
    backup.seed_source("orders", 10, 1).await;
    backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();

    let TestBackup {
        service, worker, ..
    } = backup;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(worker.run(async move {
        let _ = shutdown_rx.await;
    }));

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let records = service.records().table_backups.get_all().await.unwrap();
            if records.iter().all(TableBackup::is_complete) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(()).unwrap();
    let summary = handle.await.unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.continued, 2);
}
