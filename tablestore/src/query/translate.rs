use std::collections::BTreeSet;

use tracing::debug;

use crate::bail;
use crate::entity::{Entity, EntityDescriptor, KeySource};
use crate::error::{ErrorKind, TableResult};
use crate::keys::KeyTarget;
use crate::query::{CompareOp, Filter};
use crate::table_error;
use crate::types::Value;

/// A comparison between an entity member and a constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub member: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Condition {
    pub fn new(member: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            member: member.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(member: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(member, CompareOp::Eq, value)
    }

    /// Evaluates the condition against a member value.
    pub fn matches(&self, value: &Value) -> bool {
        self.op.evaluate(value, &self.value)
    }
}

/// Result of translating member conditions for one entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedQuery {
    /// Filter evaluated by the store, if any condition could be expressed natively.
    pub filter: Option<Filter>,
    /// Conditions evaluated on hydrated entities after they are read.
    pub post_filter: Vec<Condition>,
    /// Members whose conditions were folded into [`TranslatedQuery::filter`].
    pub used_members: Vec<String>,
}

impl TranslatedQuery {
    /// Returns `true` if `entity` satisfies every post-filter condition.
    pub fn matches<T: Entity>(&self, descriptor: &EntityDescriptor<T>, entity: &T) -> bool {
        self.post_filter.iter().all(|condition| {
            descriptor
                .member(&condition.member)
                .is_some_and(|member| condition.matches(&member.get(entity)))
        })
    }
}

/// Translates member conditions into a store filter plus client-side conditions.
///
/// Equality on key members becomes `RowKey`/`PartitionKey` equality. A scoped key is used as
/// soon as one contributor is compared for equality, and then every contributor must be.
pub fn translate<T: Entity>(
    descriptor: &EntityDescriptor<T>,
    conditions: &[Condition],
) -> TableResult<TranslatedQuery> {
    let mut resolved = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let index = descriptor.member_index(&condition.member).ok_or_else(|| {
            table_error!(
                ErrorKind::UnknownMember,
                "Condition refers to an unknown member",
                format!(
                    "member `{}` of `{}`",
                    condition.member,
                    descriptor.type_name()
                )
            )
        })?;
        resolved.push((index, condition));
    }

    let mut filters = Vec::new();
    let mut used = BTreeSet::new();
    let mut consumed = vec![false; resolved.len()];
    let mut row_key = None;

    for target in [KeyTarget::RowKey, KeyTarget::PartitionKey] {
        match descriptor.key_source(target) {
            KeySource::Scoped {
                scope,
                contributors,
            } => {
                let triggered = resolved.iter().any(|(index, condition)| {
                    condition.op == CompareOp::Eq
                        && contributors.iter().any(|(contributor, _)| contributor == index)
                });
                if !triggered {
                    continue;
                }

                let mut values = Vec::with_capacity(contributors.len());
                for (contributor, _) in contributors {
                    let member = &descriptor.members()[*contributor];
                    let Some(position) = resolved.iter().position(|(index, condition)| {
                        index == contributor && condition.op == CompareOp::Eq
                    }) else {
                        bail!(
                            ErrorKind::MissingScopeMember,
                            "Scoped key query is missing a contributing member",
                            format!("member `{}` of scope `{scope}`", member.name())
                        );
                    };

                    values.push(resolved[position].1.value.clone());
                    consumed[position] = true;
                    used.insert(member.name().to_string());
                }

                let key = descriptor.scoped_key(contributors, &values)?;
                filters.push(key_filter(target, key.clone()));
                if target == KeyTarget::RowKey {
                    row_key = Some(key);
                }
            }
            KeySource::Member { index, strategy } => {
                let member = &descriptor.members()[*index];
                let mut matched = false;

                for (position, (condition_index, condition)) in resolved.iter().enumerate() {
                    if condition_index != index {
                        continue;
                    }

                    if condition.op != CompareOp::Eq {
                        if strategy.equality_only() {
                            bail!(
                                ErrorKind::InvalidArgument,
                                "Key member only supports equality comparisons",
                                format!(
                                    "member `{}` compared with `{}`",
                                    member.name(),
                                    condition.op
                                )
                            );
                        }
                        continue;
                    }

                    let Some(key) =
                        strategy.generate_key(row_key.as_deref(), &condition.value, member.info())?
                    else {
                        continue;
                    };

                    if target == KeyTarget::RowKey && row_key.is_none() {
                        row_key = Some(key.clone());
                    }
                    filters.push(key_filter(target, key));
                    used.insert(member.name().to_string());
                    matched = true;
                    // Lossy keys only narrow the scan, the member still needs its own comparison.
                    consumed[position] = !strategy.equality_only();
                }

                if !matched
                    && target == KeyTarget::PartitionKey
                    && strategy.derives_from_row_key()
                    && let Some(key) =
                        strategy.generate_key(row_key.as_deref(), &Value::Null, member.info())?
                {
                    filters.push(key_filter(target, key));
                }
            }
        }
    }

    let timestamp = descriptor.timestamp_member().map(|member| member.name());
    let mut post_filter = Vec::new();

    for (position, (index, condition)) in resolved.iter().enumerate() {
        if consumed[position] {
            continue;
        }

        let member = &descriptor.members()[*index];
        if Some(member.name()) == timestamp {
            filters.push(Filter::compare("Timestamp", condition.op, condition.value.clone()));
            used.insert(member.name().to_string());
            continue;
        }

        match member.storage() {
            Some(codec) if codec.filterable() => {
                filters.push(Filter::compare(
                    codec.property_name(member.info()),
                    condition.op,
                    condition.value.clone(),
                ));
                used.insert(member.name().to_string());
            }
            _ => post_filter.push((*condition).clone()),
        }
    }

    let translated = TranslatedQuery {
        filter: Filter::all(filters),
        post_filter,
        used_members: used.into_iter().collect(),
    };

    debug!(
        entity_type = descriptor.type_name(),
        filter = ?translated.filter.as_ref().map(ToString::to_string),
        post_filter = translated.post_filter.len(),
        "translated query conditions"
    );

    Ok(translated)
}

fn key_filter(target: KeyTarget, key: String) -> Filter {
    match target {
        KeyTarget::RowKey => Filter::row_key_eq(key),
        KeyTarget::PartitionKey => Filter::partition_key_eq(key),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::entity::Member;
    use crate::keys::{DayOfYear, DirectKey, RowKeyPrefix, ScopeContribution};
    use crate::types::MemberType;

    #[derive(Debug, Default)]
    struct Order {
        id: Uuid,
        placed: Option<DateTime<Utc>>,
        customer: String,
        total: f64,
        notes: String,
        modified: Option<DateTime<Utc>>,
    }

    fn by_day() -> EntityDescriptor<Order> {
        EntityDescriptor::builder("Order")
            .member(Member::field("id", MemberType::Guid, |o: &Order| o.id, |o, v| o.id = v).row_key(DirectKey))
            .member(
                Member::optional_field("placed", MemberType::DateTime, |o: &Order| o.placed, |o, v| o.placed = v)
                    .partition_key(DayOfYear)
                    .property(),
            )
            .member(
                Member::field("total", MemberType::Double, |o: &Order| o.total, |o, v| o.total = v)
                    .property_named("Total"),
            )
            .member(
                Member::field("notes", MemberType::String, |o: &Order| o.notes.clone(), |o, v| o.notes = v)
                    .overflow_property(),
            )
            .member(
                Member::optional_field("modified", MemberType::DateTime, |o: &Order| o.modified, |o, v| o.modified = v)
                    .timestamp(),
            )
            .build()
            .unwrap()
    }

    fn by_customer() -> EntityDescriptor<Order> {
        EntityDescriptor::builder("Order")
            .member(
                Member::field("id", MemberType::Guid, |o: &Order| o.id, |o, v| o.id = v)
                    .scope(ScopeContribution::new("customer_order", 2.0)),
            )
            .member(
                Member::field("customer", MemberType::String, |o: &Order| o.customer.clone(), |o, v| o.customer = v)
                    .partition_key(DirectKey)
                    .scope(ScopeContribution::new("customer_order", 1.0))
                    .property(),
            )
            .scoped_row_key("customer_order")
            .build()
            .unwrap()
    }

    #[test]
    fn row_key_equality_derives_the_prefix_partition() {
        let descriptor = EntityDescriptor::builder("Order")
            .member(
                Member::field("id", MemberType::Guid, |o: &Order| o.id, |o, v| o.id = v)
                    .row_key(DirectKey)
                    .partition_key(RowKeyPrefix::default()),
            )
            .build()
            .unwrap();
        let id = Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap();

        let translated = translate(&descriptor, &[Condition::eq("id", id)]).unwrap();

        assert_eq!(
            translated.filter.unwrap().to_string(),
            "(RowKey eq '3fa85f6457174562b3fc2c963f66afa6') and (PartitionKey eq '3f')"
        );
        assert_eq!(translated.used_members, vec!["id".to_string()]);
        assert!(translated.post_filter.is_empty());
    }

    #[test]
    fn day_partitions_support_equality_only() {
        let descriptor = by_day();
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let translated = translate(&descriptor, &[Condition::eq("placed", when)]).unwrap();
        assert_eq!(
            translated.filter.unwrap().to_string(),
            "(PartitionKey eq '2024_61') and (placed eq datetime'2024-03-01T00:00:00.000000Z')"
        );

        let error = translate(
            &descriptor,
            &[Condition::new("placed", CompareOp::Gt, when)],
        )
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn timestamp_and_plain_properties_are_native() {
        let descriptor = by_day();
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let translated = translate(
            &descriptor,
            &[
                Condition::new("modified", CompareOp::Ge, when),
                Condition::new("total", CompareOp::Lt, 10.5),
                Condition::eq("notes", "urgent"),
            ],
        )
        .unwrap();

        assert_eq!(
            translated.filter.unwrap().to_string(),
            "(Timestamp ge datetime'2024-03-01T00:00:00.000000Z') and (Total lt 10.5)"
        );
        assert_eq!(translated.post_filter, vec![Condition::eq("notes", "urgent")]);
        assert_eq!(
            translated.used_members,
            vec!["modified".to_string(), "total".to_string()]
        );
    }

    #[test]
    fn scoped_keys_need_every_contributor() {
        let descriptor = by_customer();
        let id = Uuid::from_u128(1);

        let translated = translate(
            &descriptor,
            &[Condition::eq("id", id), Condition::eq("customer", "acme")],
        )
        .unwrap();
        assert_eq!(
            translated.filter.unwrap().to_string(),
            "(RowKey eq 'acme___00000000000000000000000000000001') and (PartitionKey eq 'acme')"
        );

        let error = translate(&descriptor, &[Condition::eq("id", id)]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingScopeMember);
        assert!(error.detail().unwrap().contains("customer"));
    }

    #[test]
    fn non_key_comparisons_fall_back_to_post_filter() {
        let descriptor = by_customer();

        let translated = translate(
            &descriptor,
            &[Condition::new("id", CompareOp::Ne, Uuid::nil())],
        )
        .unwrap();

        assert_eq!(translated.filter, None);
        assert_eq!(translated.post_filter.len(), 1);

        let order = Order {
            id: Uuid::from_u128(9),
            ..Default::default()
        };
        assert!(translated.matches(&descriptor, &order));
        assert!(!translated.matches(&descriptor, &Order::default()));
    }

    #[test]
    fn unknown_members_are_rejected() {
        let error = translate(&by_day(), &[Condition::eq("price", 1.0)]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownMember);
    }
}
