use std::fmt;
use std::sync::Arc;

use crate::codec::{BasePropertyCodec, OverflowPropertyCodec, PropertyCodec};
use crate::entity::Entity;
use crate::entity::modifier::SaveModifier;
use crate::error::{TableError, TableResult};
use crate::keys::{KeyStrategy, ScopeContribution};
use crate::types::{MemberType, Value};

/// Name and declared type of an entity member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberInfo {
    pub name: String,
    pub member_type: MemberType,
}

impl MemberInfo {
    pub fn new(name: impl Into<String>, member_type: MemberType) -> Self {
        Self {
            name: name.into(),
            member_type,
        }
    }
}

type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> TableResult<()> + Send + Sync>;

/// A member of entity type `T` together with its accessors and roles.
pub struct Member<T: Entity> {
    pub(crate) info: MemberInfo,
    getter: Getter<T>,
    setter: Setter<T>,
    pub(crate) row_key: Option<Arc<dyn KeyStrategy>>,
    pub(crate) partition_key: Option<Arc<dyn KeyStrategy>>,
    pub(crate) scopes: Vec<ScopeContribution>,
    pub(crate) storage: Option<Box<dyn PropertyCodec>>,
    pub(crate) timestamp: bool,
    pub(crate) etag: bool,
    pub(crate) modifiers: Vec<Arc<dyn SaveModifier<T>>>,
}

impl<T: Entity> Member<T> {
    /// Creates a member from raw accessors working on [`Value`]s.
    pub fn new<G, S>(name: impl Into<String>, member_type: MemberType, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> TableResult<()> + Send + Sync + 'static,
    {
        Self {
            info: MemberInfo::new(name, member_type),
            getter: Box::new(getter),
            setter: Box::new(setter),
            row_key: None,
            partition_key: None,
            scopes: vec![],
            storage: None,
            timestamp: false,
            etag: false,
            modifiers: vec![],
        }
    }

    /// Creates a member backed by a field of a type convertible to and from [`Value`].
    pub fn field<V, G, S>(name: impl Into<String>, member_type: MemberType, get: G, set: S) -> Self
    where
        V: Into<Value> + TryFrom<Value, Error = TableError>,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self::new(
            name,
            member_type,
            move |entity| get(entity).into(),
            move |entity, value| {
                set(entity, V::try_from(value)?);
                Ok(())
            },
        )
    }

    /// Creates a member backed by an optional field; `None` maps to [`Value::Null`].
    pub fn optional_field<V, G, S>(
        name: impl Into<String>,
        member_type: MemberType,
        get: G,
        set: S,
    ) -> Self
    where
        V: Into<Value> + TryFrom<Value, Error = TableError>,
        G: Fn(&T) -> Option<V> + Send + Sync + 'static,
        S: Fn(&mut T, Option<V>) + Send + Sync + 'static,
    {
        Self::new(
            name,
            member_type,
            move |entity| get(entity).into(),
            move |entity, value| {
                set(entity, value.optional::<V>()?);
                Ok(())
            },
        )
    }

    pub fn row_key(mut self, strategy: impl KeyStrategy + 'static) -> Self {
        self.row_key = Some(Arc::new(strategy));
        self
    }

    pub fn partition_key(mut self, strategy: impl KeyStrategy + 'static) -> Self {
        self.partition_key = Some(Arc::new(strategy));
        self
    }

    /// Contributes this member's direct key to a scoped key.
    pub fn scope(mut self, contribution: ScopeContribution) -> Self {
        self.scopes.push(contribution);
        self
    }

    /// Stores the member as a property named after the member.
    pub fn property(self) -> Self {
        self.stored_as(BasePropertyCodec::new())
    }

    pub fn property_named(self, name: impl Into<String>) -> Self {
        self.stored_as(BasePropertyCodec::named(name))
    }

    /// Stores the member as a property that is split when it exceeds the single property limit.
    pub fn overflow_property(self) -> Self {
        self.stored_as(OverflowPropertyCodec::new())
    }

    pub fn stored_as(mut self, codec: impl PropertyCodec + 'static) -> Self {
        self.storage = Some(Box::new(codec));
        self
    }

    /// Marks the member as receiving the store's modification timestamp.
    pub fn timestamp(mut self) -> Self {
        self.timestamp = true;
        self
    }

    /// Marks the member as receiving the store's concurrency token.
    pub fn etag(mut self) -> Self {
        self.etag = true;
        self
    }

    pub fn modifier(mut self, modifier: impl SaveModifier<T> + 'static) -> Self {
        self.modifiers.push(Arc::new(modifier));
        self
    }

    pub fn info(&self) -> &MemberInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn storage(&self) -> Option<&dyn PropertyCodec> {
        self.storage.as_deref()
    }

    pub fn get(&self, entity: &T) -> Value {
        (self.getter)(entity)
    }

    pub fn set(&self, entity: &mut T, value: Value) -> TableResult<()> {
        (self.setter)(entity, value)
    }
}

impl<T: Entity> fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("info", &self.info)
            .field("row_key", &self.row_key)
            .field("partition_key", &self.partition_key)
            .field("scopes", &self.scopes)
            .field("storage", &self.storage)
            .field("timestamp", &self.timestamp)
            .field("etag", &self.etag)
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}
