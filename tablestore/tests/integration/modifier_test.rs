use std::sync::Arc;

use config::shared::RepositoryConfig;
use telemetry::init_test_tracing;

use tablestore::entity::EntityDescriptor;
use tablestore::error::ErrorKind;
use tablestore::repository::{CreateOutcome, EntityRepository, UpdateOutcome};
use tablestore::store::{MemoryStorageAccount, StorageAccount};
use tablestore::test_utils::entities::{
    NameIndex, Product, RejectingModifier, indexed_product_descriptor, product_members,
};
use tablestore::test_utils::fault::{FaultInjectingTable, Faults};

async fn indexed_products(
    account: &dyn StorageAccount,
) -> (NameIndex, EntityRepository<Product>) {
    let index = NameIndex::new(account.table("product_names"));
    index.table().create_if_not_exists().await.unwrap();

    let repository = EntityRepository::new(
        indexed_product_descriptor(index.clone()),
        account.table("products"),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    (index, repository)
}

#[tokio::test(flavor = "multi_thread")]
async fn modifiers_run_before_the_write() {
    init_test_tracing();
    let account = MemoryStorageAccount::new("catalog");
    let (_index, repository) = indexed_products(&account).await;

    let kettle = Product::new("Kettle", "kitchen", 24.5);
    assert!(matches!(
        repository.create(kettle.clone()).await.unwrap(),
        CreateOutcome::Created(_)
    ));
    assert_eq!(account.rows("product_names").await.unwrap().len(), 1);

    let CreateOutcome::ModifierFailed(failure) = repository
        .create(Product::new("Kettle", "kitchen", 30.0))
        .await
        .unwrap()
    else {
        panic!("duplicate name was accepted");
    };
    assert_eq!(failure.member, "name");
    assert_eq!(failure.error.kind(), ErrorKind::InvalidArgument);
    assert_eq!(account.rows("products").await.unwrap().len(), 1);

    let renamed = repository
        .update(kettle.id, |p| p.name = "Electric kettle".to_string())
        .await
        .unwrap();
    assert!(matches!(renamed, UpdateOutcome::Updated(_)));

    let names: Vec<_> = account
        .rows("product_names")
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.row_key)
        .collect();
    assert_eq!(names, vec!["Electric kettle", "Kettle"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_store_writes_roll_modifiers_back() {
    init_test_tracing();
    let account = MemoryStorageAccount::new("catalog");
    let index = NameIndex::new(account.table("product_names"));
    index.table().create_if_not_exists().await.unwrap();

    let faults = Arc::new(Faults::default());
    let products = FaultInjectingTable::new(account.table("products"), faults.clone());
    let repository = EntityRepository::new(
        indexed_product_descriptor(index.clone()),
        Arc::new(products),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    faults.reject_writes(1);
    let error = repository
        .create(Product::new("Lamp", "living", 40.0))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::StoreRequestFailed);
    assert_eq!(index.rollbacks(), 1);
    assert!(account.rows("product_names").await.unwrap().is_empty());
    assert!(account.rows("products").await.unwrap().is_empty());

    let product = Product::new("Lamp", "living", 40.0);
    assert!(matches!(
        repository.create(product).await.unwrap(),
        CreateOutcome::Created(_)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn modifier_failures_undo_earlier_modifiers() {
    init_test_tracing();
    let account = MemoryStorageAccount::new("catalog");
    let index = NameIndex::new(account.table("product_names"));
    index.table().create_if_not_exists().await.unwrap();

    let descriptor = product_members()
        .into_iter()
        .map(|member| match member.name() {
            "name" => member.modifier(index.clone()),
            "category" => member.modifier(RejectingModifier),
            _ => member,
        })
        .fold(EntityDescriptor::builder("Product"), |builder, member| builder.member(member))
        .build()
        .unwrap();
    let repository = EntityRepository::new(
        Arc::new(descriptor),
        account.table("products"),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    let CreateOutcome::ModifierFailed(failure) = repository
        .create(Product::new("Rug", "living", 120.0))
        .await
        .unwrap()
    else {
        panic!("rejecting modifier did not fail the save");
    };

    assert_eq!(failure.member, "category");
    assert!(failure.rollback_error.is_none());
    assert_eq!(index.rollbacks(), 1);
    assert!(account.rows("product_names").await.unwrap().is_empty());
    assert!(account.rows("products").await.unwrap().is_empty());
}
