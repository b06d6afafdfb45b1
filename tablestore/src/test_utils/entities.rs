use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::{EntityDescriptor, Member, MemberInfo, ModifierContext, Rollback, SaveModifier};
use crate::error::{ErrorKind, TableResult};
use crate::keys::{DayOfYear, DirectKey, HashRemainder, ScopeContribution};
use crate::store::TableClient;
use crate::table_error;
use crate::types::{ANY_ETAG, MemberType, TableRow};

/// Catalog entry keyed by id and spread over hash partitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i32,
    pub description: String,
    pub updated: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl Product {
    pub fn new(name: &str, category: &str, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.to_string(),
            price,
            ..Default::default()
        }
    }
}

/// Members of [`Product`], without modifiers.
pub fn product_members() -> Vec<Member<Product>> {
    vec![
        Member::field("id", MemberType::Guid, |p: &Product| p.id, |p, v| p.id = v)
            .row_key(DirectKey)
            .partition_key(HashRemainder),
        Member::field("name", MemberType::String, |p: &Product| p.name.clone(), |p, v| p.name = v)
            .property_named("Name"),
        Member::field(
            "category",
            MemberType::String,
            |p: &Product| p.category.clone(),
            |p, v| p.category = v,
        )
        .property_named("Category"),
        Member::field("price", MemberType::Double, |p: &Product| p.price, |p, v| p.price = v)
            .property_named("Price"),
        Member::field("stock", MemberType::Int32, |p: &Product| p.stock, |p, v| p.stock = v)
            .property_named("Stock"),
        Member::field(
            "description",
            MemberType::String,
            |p: &Product| p.description.clone(),
            |p, v| p.description = v,
        )
        .overflow_property(),
        Member::optional_field("updated", MemberType::DateTime, |p: &Product| p.updated, |p, v| {
            p.updated = v
        })
        .timestamp(),
        Member::optional_field("etag", MemberType::String, |p: &Product| p.etag.clone(), |p, v| {
            p.etag = v
        })
        .etag(),
    ]
}

pub fn product_descriptor() -> Arc<EntityDescriptor<Product>> {
    product_members()
        .into_iter()
        .fold(EntityDescriptor::builder("Product"), |builder, member| builder.member(member))
        .build()
        .map(Arc::new)
        .unwrap()
}

/// A product whose name is kept unique through an index table.
pub fn indexed_product_descriptor(index: NameIndex) -> Arc<EntityDescriptor<Product>> {
    product_members()
        .into_iter()
        .map(|member| {
            if member.name() == "name" {
                member.modifier(index.clone())
            } else {
                member
            }
        })
        .fold(EntityDescriptor::builder("Product"), |builder, member| builder.member(member))
        .build()
        .map(Arc::new)
        .unwrap()
}

/// Order placed by a customer, partitioned by day and keyed by customer and number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub customer: String,
    pub number: i32,
    pub placed: DateTime<Utc>,
    pub total: f64,
}

pub fn order_descriptor() -> Arc<EntityDescriptor<Order>> {
    EntityDescriptor::builder("Order")
        .member(
            Member::field(
                "customer",
                MemberType::String,
                |o: &Order| o.customer.clone(),
                |o, v| o.customer = v,
            )
            .scope(ScopeContribution::new("order", 1.0))
            .property_named("Customer"),
        )
        .member(
            Member::field("number", MemberType::Int32, |o: &Order| o.number, |o, v| o.number = v)
                .scope(ScopeContribution::new("order", 2.0))
                .property_named("Number"),
        )
        .member(
            Member::field("placed", MemberType::DateTime, |o: &Order| o.placed, |o, v| o.placed = v)
                .partition_key(DayOfYear)
                .property_named("Placed"),
        )
        .member(
            Member::field("total", MemberType::Double, |o: &Order| o.total, |o, v| o.total = v)
                .property_named("Total"),
        )
        .scoped_row_key("order")
        .build()
        .map(Arc::new)
        .unwrap()
}

/// Keeps product names unique by claiming a row per name in `table`.
#[derive(Debug, Clone)]
pub struct NameIndex {
    table: Arc<dyn TableClient>,
    rollbacks: Arc<AtomicUsize>,
}

impl NameIndex {
    pub const PARTITION: &'static str = "names";

    pub fn new(table: Arc<dyn TableClient>) -> Self {
        Self {
            table,
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn table(&self) -> &Arc<dyn TableClient> {
        &self.table
    }

    /// Number of compensations that ran.
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    async fn claim(&self, name: &str, owner: &str) -> TableResult<Rollback> {
        let row = TableRow::new(Self::PARTITION, name).with_property("Owner", owner);
        if let Err(err) = self.table.create(row).await {
            if err.kind() == ErrorKind::EntityAlreadyExists {
                return Err(table_error!(
                    ErrorKind::InvalidArgument,
                    "Product name is already taken",
                    name
                ));
            }
            return Err(err);
        }

        let table = self.table.clone();
        let rollbacks = self.rollbacks.clone();
        let name = name.to_string();
        Ok(Rollback::new(format!("release name {name}"), move || async move {
            rollbacks.fetch_add(1, Ordering::SeqCst);
            table.delete(Self::PARTITION, &name, ANY_ETAG).await
        }))
    }
}

#[async_trait]
impl SaveModifier<Product> for NameIndex {
    async fn on_create(
        &self,
        _member: &MemberInfo,
        context: &ModifierContext<'_, Product>,
    ) -> TableResult<Rollback> {
        match context.new {
            Some((product, _)) => self.claim(&product.name, context.row_key).await,
            None => Ok(Rollback::none()),
        }
    }

    async fn on_update(
        &self,
        _member: &MemberInfo,
        context: &ModifierContext<'_, Product>,
    ) -> TableResult<Rollback> {
        match (context.old, context.new) {
            (Some((old, _)), Some((new, _))) if old.name != new.name => {
                self.claim(&new.name, context.row_key).await
            }
            _ => Ok(Rollback::none()),
        }
    }
}

/// Modifier that always fails, for exercising rollbacks.
#[derive(Debug, Default)]
pub struct RejectingModifier;

#[async_trait]
impl SaveModifier<Product> for RejectingModifier {
    async fn on_create(
        &self,
        member: &MemberInfo,
        _context: &ModifierContext<'_, Product>,
    ) -> TableResult<Rollback> {
        Err(table_error!(
            ErrorKind::InvalidArgument,
            "Rejected by modifier",
            member.name.clone()
        ))
    }
}
