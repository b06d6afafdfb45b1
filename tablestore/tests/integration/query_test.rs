use chrono::{TimeZone, Utc};
use config::shared::RepositoryConfig;
use telemetry::init_test_tracing;

use tablestore::error::ErrorKind;
use tablestore::query::{CompareOp, Condition, translate};
use tablestore::repository::EntityRepository;
use tablestore::store::{MemoryStorageAccount, StorageAccount};
use tablestore::test_utils::entities::{Order, Product, order_descriptor, product_descriptor};

async fn seeded_products() -> EntityRepository<Product> {
    let account = MemoryStorageAccount::new("catalog");
    let repository = EntityRepository::new(
        product_descriptor(),
        account.table("products"),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    for (name, category, price) in [
        ("Kettle", "kitchen", 24.5),
        ("Toaster", "kitchen", 39.0),
        ("Pan", "kitchen", 12.0),
        ("Lamp", "living", 40.0),
        ("Rug", "living", 120.0),
    ] {
        let mut product = Product::new(name, category, price);
        product.description = format!("{name} for the {category}");
        repository.create(product).await.unwrap();
    }

    repository
}

fn names(products: &[Product]) -> Vec<String> {
    let mut names: Vec<_> = products.iter().map(|p| p.name.clone()).collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread")]
async fn property_conditions_become_store_filters() {
    init_test_tracing();
    let repository = seeded_products().await;

    let conditions = [
        Condition::eq("category", "kitchen"),
        Condition::new("price", CompareOp::Gt, 20.0),
    ];
    let translated = translate(repository.descriptor(), &conditions).unwrap();
    assert!(translated.post_filter.is_empty());
    assert_eq!(
        translated.filter.unwrap().to_string(),
        "(Category eq 'kitchen') and (Price gt 20.0)"
    );

    let found = repository.get_by(&conditions).await.unwrap();
    assert_eq!(names(&found), vec!["Kettle", "Toaster"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn overflow_members_are_filtered_after_reading() {
    init_test_tracing();
    let repository = seeded_products().await;

    let conditions = [Condition::eq("description", "Rug for the living")];
    let translated = translate(repository.descriptor(), &conditions).unwrap();
    assert!(translated.filter.is_none());
    assert_eq!(translated.post_filter.len(), 1);

    let found = repository.get_by(&conditions).await.unwrap();
    assert_eq!(names(&found), vec!["Rug"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_members_are_rejected() {
    init_test_tracing();
    let repository = seeded_products().await;

    let error = repository
        .get_by(&[Condition::eq("colour", "red")])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnknownMember);
}

async fn seeded_orders() -> EntityRepository<Order> {
    let account = MemoryStorageAccount::new("shop");
    let repository = EntityRepository::new(
        order_descriptor(),
        account.table("orders"),
        RepositoryConfig::default(),
    );
    repository.ensure_table().await.unwrap();

    let march_first = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let march_second = Utc.with_ymd_and_hms(2024, 3, 2, 14, 0, 0).unwrap();
    for (customer, number, placed, total) in [
        ("alice", 1, march_first, 10.0),
        ("alice", 2, march_second, 20.0),
        ("bob", 1, march_first, 30.0),
    ] {
        repository
            .create(Order {
                customer: customer.to_string(),
                number,
                placed,
                total,
            })
            .await
            .unwrap();
    }

    repository
}

#[tokio::test(flavor = "multi_thread")]
async fn scoped_and_day_keys_narrow_the_scan() {
    init_test_tracing();
    let repository = seeded_orders().await;
    let placed = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();

    let conditions = [
        Condition::eq("customer", "bob"),
        Condition::eq("number", 1),
        Condition::eq("placed", placed),
    ];
    let filter = translate(repository.descriptor(), &conditions)
        .unwrap()
        .filter
        .unwrap()
        .to_string();
    assert!(filter.contains("RowKey eq 'bob___1'"));
    assert!(filter.contains("PartitionKey eq '2024_61'"));

    let found = repository.get_by(&conditions).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].total, 30.0);
    assert_eq!(found[0].customer, "bob");
}

#[tokio::test(flavor = "multi_thread")]
async fn scoped_key_queries_need_every_contributor() {
    init_test_tracing();
    let repository = seeded_orders().await;

    let error = repository
        .get_by(&[Condition::eq("customer", "alice")])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MissingScopeMember);

    let orders = repository
        .get_by(&[Condition::new("total", CompareOp::Ge, 20.0)])
        .await
        .unwrap();
    assert_eq!(orders.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn day_keys_only_support_equality() {
    init_test_tracing();
    let repository = seeded_orders().await;

    let error = repository
        .get_by(&[Condition::new(
            "placed",
            CompareOp::Gt,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        )])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}
