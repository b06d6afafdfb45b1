use config::shared::BackupConfig;
use telemetry::init_test_tracing;

use tablestore::error::ErrorKind;
use tablestore::failpoints::BACKUP_BEFORE_PROGRESS_PERSIST;
use tablestore::test_utils::backup::TestBackup;
use tablestore::test_utils::failpoints::TestFailScenario;

fn config() -> BackupConfig {
    BackupConfig {
        max_rows: 20,
        segment_size: 10,
        batch_size: 10,
        ..BackupConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_before_persisting_progress_repeats_the_invocation() {
    init_test_tracing();
    let scenario = TestFailScenario::setup(&[(BACKUP_BEFORE_PROGRESS_PERSIST, "return")]);

    let mut backup = TestBackup::new(config()).await;
    backup.seed_source("products", 35, 3).await;
    let invocations = backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();
    let operation_id = invocations[0].operation_id;

    let summary = backup.worker.run_until_idle().await;
    assert_eq!(summary.failed, 1);

    // Rows reached the destination but the record still points at the start.
    assert_eq!(backup.destination_memory.rows("products").await.unwrap().len(), 20);
    let record = backup
        .service
        .records()
        .table_backups
        .get_all()
        .await
        .unwrap()
        .remove(0);
    assert!(record.continuation_token.is_empty());
    assert_eq!(record.rows_copied, 0);
    assert!(!record.is_complete());

    scenario.disable(BACKUP_BEFORE_PROGRESS_PERSIST);
    backup.service.resume(operation_id).await.unwrap();
    let summary = backup.worker.run_until_idle().await;
    assert_eq!(summary.completed, 1);

    assert!(backup.tables_match("products").await);
    let record = backup
        .service
        .records()
        .table_backups
        .get_all()
        .await
        .unwrap()
        .remove(0);
    assert_eq!(record.rows_copied, 35);
    assert!(record.is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn failpoint_parameter_selects_the_error_kind() {
    init_test_tracing();
    let _scenario =
        TestFailScenario::setup(&[(BACKUP_BEFORE_PROGRESS_PERSIST, "return(request_failed)")]);

    let backup = TestBackup::new(config()).await;
    backup.seed_source("products", 5, 1).await;
    let invocations = backup
        .service
        .start(backup.repository_backup())
        .await
        .unwrap();

    let error = backup
        .service
        .resume(invocations[0].operation_id)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::StoreRequestFailed);
}
