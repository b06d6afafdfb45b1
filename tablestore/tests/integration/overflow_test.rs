use config::shared::RepositoryConfig;
use telemetry::init_test_tracing;

use tablestore::codec::OVERFLOW_STRING_SENTINEL;
use tablestore::error::ErrorKind;
use tablestore::repository::EntityRepository;
use tablestore::store::{MemoryStorageAccount, StorageAccount};
use tablestore::test_utils::entities::{Product, product_descriptor};
use tablestore::types::Value;

#[tokio::test(flavor = "multi_thread")]
async fn long_members_round_trip_through_the_store() {
    init_test_tracing();
    let account = MemoryStorageAccount::new("catalog");
    let repository = EntityRepository::new(
        product_descriptor(),
        account.table("products"),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    let mut product = Product::new("Encyclopedia", "books", 300.0);
    product.description = "é".repeat(40_000) + &"x".repeat(60_000);
    repository.create(product.clone()).await.unwrap();

    let rows = account.rows("products").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].property("description"),
        Some(Value::String(OVERFLOW_STRING_SENTINEL.to_string()))
    );
    assert!(rows[0].properties.contains_key("description_overflow_3"));
    assert!(!rows[0].properties.contains_key("description_overflow_4"));

    let stored = repository.get_by_id(product.id).await.unwrap().unwrap();
    assert_eq!(stored.description, product.description);

    let short = repository
        .update(product.id, |p| p.description = "abridged".to_string())
        .await
        .unwrap();
    assert!(matches!(short, tablestore::repository::UpdateOutcome::Updated(_)));

    let rows = account.rows("products").await.unwrap();
    assert_eq!(
        rows[0].property("description"),
        Some(Value::String("abridged".to_string()))
    );
    assert!(!rows[0].properties.contains_key("description_overflow_0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn broken_overflow_chains_are_reported() {
    init_test_tracing();
    let account = MemoryStorageAccount::new("catalog");
    let table = account.table("products");
    let repository = EntityRepository::new(
        product_descriptor(),
        table.clone(),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    let mut product = Product::new("Atlas", "books", 80.0);
    product.description = "y".repeat(70_000);
    repository.create(product.clone()).await.unwrap();

    let mut row = account.rows("products").await.unwrap().remove(0);
    row.properties.remove("description_overflow_1");
    table.insert_or_replace(row).await.unwrap();

    let error = repository.get_by_id(product.id).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::OverflowChainCorrupted);
}
