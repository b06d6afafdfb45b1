use std::sync::Arc;

use config::shared::RepositoryConfig;
use futures::future::join_all;
use telemetry::init_test_tracing;

use tablestore::error::ErrorKind;
use tablestore::repository::{CreateOutcome, DeleteOutcome, EntityRepository, UpdateOutcome};
use tablestore::store::{MemoryStorageAccount, StorageAccount};
use tablestore::test_utils::entities::{Product, product_descriptor};

async fn products() -> (MemoryStorageAccount, EntityRepository<Product>) {
    let account = MemoryStorageAccount::new("catalog");
    let repository = EntityRepository::new(
        product_descriptor(),
        account.table("products"),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    (account, repository)
}

#[tokio::test(flavor = "multi_thread")]
async fn create_get_update_and_delete() {
    init_test_tracing();
    let (_account, repository) = products().await;

    let product = Product::new("Kettle", "kitchen", 24.5);
    let CreateOutcome::Created(created) = repository.create(product.clone()).await.unwrap() else {
        panic!("product was not created");
    };
    assert!(created.etag.is_some());
    assert!(created.updated.is_some());

    let stored = repository.get_by_id(product.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Kettle");
    assert_eq!(stored.price, 24.5);
    assert_eq!(stored.etag, created.etag);

    assert!(matches!(
        repository.create(product.clone()).await.unwrap(),
        CreateOutcome::AlreadyExists
    ));

    let UpdateOutcome::Updated(updated) = repository
        .update(product.id, |p| p.price = 19.0)
        .await
        .unwrap()
    else {
        panic!("product was not updated");
    };
    assert_eq!(updated.price, 19.0);
    assert_ne!(updated.etag, created.etag);

    assert!(matches!(
        repository.delete(product.id).await.unwrap(),
        DeleteOutcome::Deleted(_)
    ));
    assert!(repository.get_by_id(product.id).await.unwrap().is_none());
    assert!(matches!(
        repository.delete(product.id).await.unwrap(),
        DeleteOutcome::NotFound
    ));
    assert!(matches!(
        repository.update(product.id, |p| p.stock += 1).await.unwrap(),
        UpdateOutcome::NotFound
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn updates_must_not_change_keys() {
    init_test_tracing();
    let (_account, repository) = products().await;

    let product = Product::new("Lamp", "living", 40.0);
    repository.create(product.clone()).await.unwrap();

    let error = repository
        .update(product.id, |p| p.id = uuid::Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    assert_eq!(repository.get_by_id(product.id).await.unwrap().unwrap().name, "Lamp");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_updates_are_not_lost() {
    init_test_tracing();
    let (_account, repository) = products().await;

    let product = Product::new("Chair", "living", 55.0);
    repository.create(product.clone()).await.unwrap();

    let repository = Arc::new(repository);
    let tasks = (0..5).map(|_| {
        let repository = repository.clone();
        tokio::spawn(async move { repository.update(product.id, |p| p.stock += 1).await })
    });

    for result in join_all(tasks).await {
        assert!(matches!(result.unwrap().unwrap(), UpdateOutcome::Updated(_)));
    }

    let stored = repository.get_by_id(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_all_follows_continuation_tokens() {
    init_test_tracing();
    let (account, repository) = products().await;

    for i in 0..1_050 {
        repository
            .insert_or_replace(Product::new(&format!("item {i}"), "bulk", rand::random::<f64>()))
            .await
            .unwrap();
    }

    let all = repository.get_all().await.unwrap();
    assert_eq!(all.len(), 1_050);
    assert_eq!(account.rows("products").await.unwrap().len(), 1_050);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_table_is_reported() {
    init_test_tracing();
    let account = MemoryStorageAccount::new("catalog");
    let repository = EntityRepository::new(
        product_descriptor(),
        account.table("absent"),
        RepositoryConfig::default(),
    );

    let error = repository
        .create(Product::new("Ghost", "none", 0.0))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TableNotFound);
}
