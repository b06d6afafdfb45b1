use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entity::{Entity, Member, MemberInfo};
use crate::error::{ErrorKind, TableError, TableResult};
use crate::keys::{DirectKey, KeyStrategy, KeyTarget, ScopeContribution, scoped};
use crate::types::{MemberType, PropertyBag, TableRow, Value};
use crate::{bail, table_error};

/// Property names managed by the store itself.
const RESERVED_PROPERTY_NAMES: [&str; 4] = ["PartitionKey", "RowKey", "Timestamp", "ETag"];

/// Where the row key or partition key of an entity type comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// A single member formatted by a key strategy.
    Member {
        index: usize,
        strategy: Arc<dyn KeyStrategy>,
    },
    /// A composite of several members, sorted by contribution order.
    Scoped {
        scope: String,
        contributors: Vec<(usize, ScopeContribution)>,
    },
}

impl KeySource {
    /// Returns `true` if `member` feeds this key.
    pub fn involves(&self, member: usize) -> bool {
        match self {
            KeySource::Member { index, .. } => *index == member,
            KeySource::Scoped { contributors, .. } => {
                contributors.iter().any(|(index, _)| *index == member)
            }
        }
    }
}

/// Validated mapping of an entity type onto table rows.
#[derive(Debug)]
pub struct EntityDescriptor<T: Entity> {
    type_name: String,
    members: Vec<Member<T>>,
    row_key: KeySource,
    partition_key: KeySource,
    timestamp: Option<usize>,
    etag: Option<usize>,
}

impl<T: Entity> EntityDescriptor<T> {
    pub fn builder(type_name: impl Into<String>) -> EntityDescriptorBuilder<T> {
        EntityDescriptorBuilder {
            type_name: type_name.into(),
            members: vec![],
            scoped_row_key: vec![],
            scoped_partition_key: vec![],
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn members(&self) -> &[Member<T>] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Member<T>> {
        self.members.iter().find(|member| member.name() == name)
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|member| member.name() == name)
    }

    pub fn row_key_source(&self) -> &KeySource {
        &self.row_key
    }

    pub fn partition_key_source(&self) -> &KeySource {
        &self.partition_key
    }

    pub fn key_source(&self, target: KeyTarget) -> &KeySource {
        match target {
            KeyTarget::RowKey => &self.row_key,
            KeyTarget::PartitionKey => &self.partition_key,
        }
    }

    pub fn timestamp_member(&self) -> Option<&Member<T>> {
        self.timestamp.map(|index| &self.members[index])
    }

    pub fn etag_member(&self) -> Option<&Member<T>> {
        self.etag.map(|index| &self.members[index])
    }

    /// Generates the row key from the entity's current member values.
    pub fn row_key(&self, entity: &T) -> TableResult<Option<String>> {
        self.generate_key(&self.row_key, entity, None)
    }

    /// Generates the partition key, given the entity's already generated row key.
    pub fn partition_key(&self, entity: &T, row_key: Option<&str>) -> TableResult<Option<String>> {
        self.generate_key(&self.partition_key, entity, row_key)
    }

    fn generate_key(
        &self,
        source: &KeySource,
        entity: &T,
        row_key: Option<&str>,
    ) -> TableResult<Option<String>> {
        match source {
            KeySource::Member { index, strategy } => {
                let member = &self.members[*index];
                strategy.generate_key(row_key, &member.get(entity), member.info())
            }
            KeySource::Scoped { contributors, .. } => {
                let values: Vec<Value> = contributors
                    .iter()
                    .map(|(index, _)| self.members[*index].get(entity))
                    .collect();

                self.scoped_key(contributors, &values).map(Some)
            }
        }
    }

    /// Builds a scoped key from one value per contributor, in contributor order.
    pub(crate) fn scoped_key(
        &self,
        contributors: &[(usize, ScopeContribution)],
        values: &[Value],
    ) -> TableResult<String> {
        scoped::aggregate(
            contributors
                .iter()
                .zip(values)
                .map(|((index, contribution), value)| {
                    (contribution, self.members[*index].info(), value)
                }),
        )
    }

    /// Computes `(partition_key, row_key)` of the entity identified by `id`.
    pub fn compute_keys(&self, id: &Value) -> TableResult<(String, String)> {
        let KeySource::Member { index, strategy } = &self.row_key else {
            bail!(
                ErrorKind::InvalidArgument,
                "Row key cannot be computed from an id",
                format!("entity type `{}` uses a scoped row key", self.type_name)
            );
        };

        let row_key = strategy
            .compute_key(None, id, self.members[*index].info())?
            .ok_or_else(|| {
                table_error!(
                    ErrorKind::InvalidArgument,
                    "Id does not produce a row key",
                    format!("entity type `{}`, id {id}", self.type_name)
                )
            })?;

        let partition_key = match &self.partition_key {
            KeySource::Member { index, strategy } => strategy
                .compute_key(Some(&row_key), id, self.members[*index].info())?
                .unwrap_or_default(),
            KeySource::Scoped { scope, .. } => bail!(
                ErrorKind::InvalidArgument,
                "Partition key cannot be computed from an id",
                format!(
                    "entity type `{}` uses the scoped partition key `{scope}`",
                    self.type_name
                )
            ),
        };

        Ok((partition_key, row_key))
    }

    /// Converts every stored member of `entity` into properties.
    pub fn write_properties(&self, entity: &T) -> TableResult<PropertyBag> {
        let mut properties = PropertyBag::new();

        for member in &self.members {
            if let Some(codec) = member.storage() {
                properties.extend(codec.convert_value(&member.get(entity), member.info())?);
            }
        }

        Ok(properties)
    }

    /// Parses stored keys back into the members they were generated from, where reversible.
    pub fn apply_key(&self, entity: &mut T, target: KeyTarget, key: &str) -> TableResult<()> {
        let KeySource::Member { index, strategy } = self.key_source(target) else {
            return Ok(());
        };

        let member = &self.members[*index];
        match strategy.parse_key(key, member.info())? {
            Some(value) if !value.is_null() => member.set(entity, value),
            _ => Ok(()),
        }
    }

    /// Assigns stored properties to their members. Absent properties leave members untouched.
    pub fn apply_properties(&self, entity: &mut T, properties: &PropertyBag) -> TableResult<()> {
        for member in &self.members {
            let Some(codec) = member.storage() else {
                continue;
            };

            let value = codec.member_value(member.info(), properties)?;
            if !value.is_null() {
                member.set(entity, value)?;
            }
        }

        Ok(())
    }

    pub(crate) fn set_timestamp(&self, entity: &mut T, timestamp: DateTime<Utc>) -> TableResult<()> {
        match self.timestamp_member() {
            Some(member) => member.set(entity, Value::DateTime(timestamp)),
            None => Ok(()),
        }
    }

    pub(crate) fn set_etag(&self, entity: &mut T, etag: &str) -> TableResult<()> {
        match self.etag_member() {
            Some(member) => member.set(entity, Value::String(etag.to_string())),
            None => Ok(()),
        }
    }

    /// Materializes an entity from a stored row.
    pub fn read_row(&self, row: &TableRow) -> TableResult<T>
    where
        T: Default,
    {
        let mut entity = T::default();

        self.apply_key(&mut entity, KeyTarget::RowKey, &row.row_key)?;
        self.apply_key(&mut entity, KeyTarget::PartitionKey, &row.partition_key)?;
        self.apply_properties(&mut entity, &row.properties)?;

        if let Some(timestamp) = row.timestamp {
            self.set_timestamp(&mut entity, timestamp)?;
        }
        if let Some(etag) = &row.etag {
            self.set_etag(&mut entity, etag)?;
        }

        Ok(entity)
    }
}

/// Collects members and validates them into an [`EntityDescriptor`].
pub struct EntityDescriptorBuilder<T: Entity> {
    type_name: String,
    members: Vec<Member<T>>,
    scoped_row_key: Vec<String>,
    scoped_partition_key: Vec<String>,
}

impl<T: Entity> EntityDescriptorBuilder<T> {
    pub fn member(mut self, member: Member<T>) -> Self {
        self.members.push(member);
        self
    }

    /// Derives the row key from the members contributing to `scope`.
    pub fn scoped_row_key(mut self, scope: impl Into<String>) -> Self {
        self.scoped_row_key.push(scope.into());
        self
    }

    /// Derives the partition key from the members contributing to `scope`.
    pub fn scoped_partition_key(mut self, scope: impl Into<String>) -> Self {
        self.scoped_partition_key.push(scope.into());
        self
    }

    /// Validates the members and their roles.
    ///
    /// Every problem found is reported; several are aggregated into one error.
    pub fn build(self) -> TableResult<EntityDescriptor<T>> {
        let mut errors = Vec::new();

        self.check_member_names(&mut errors);
        let row_key = self.resolve_key(KeyTarget::RowKey, &mut errors);
        let partition_key = self.resolve_key(KeyTarget::PartitionKey, &mut errors);
        self.check_orphan_scopes(&mut errors);
        self.check_storage(&mut errors);
        let timestamp = self.single_role("timestamp", MemberType::DateTime, |m| m.timestamp, &mut errors);
        let etag = self.single_role("etag", MemberType::String, |m| m.etag, &mut errors);

        if !errors.is_empty() {
            return Err(TableError::from(errors));
        }

        let (Some(row_key), Some(partition_key)) = (row_key, partition_key) else {
            bail!(
                ErrorKind::InvalidDescriptor,
                "Entity keys could not be resolved",
                format!("entity type `{}`", self.type_name)
            );
        };

        Ok(EntityDescriptor {
            type_name: self.type_name,
            members: self.members,
            row_key,
            partition_key,
            timestamp,
            etag,
        })
    }

    fn check_member_names(&self, errors: &mut Vec<TableError>) {
        let mut seen = HashSet::new();

        for member in &self.members {
            if !seen.insert(member.name()) {
                errors.push(table_error!(
                    ErrorKind::InvalidDescriptor,
                    "Member is declared twice",
                    format!("member `{}` of `{}`", member.name(), self.type_name)
                ));
            }
        }
    }

    fn resolve_key(&self, target: KeyTarget, errors: &mut Vec<TableError>) -> Option<KeySource> {
        let (strategies, scopes) = match target {
            KeyTarget::RowKey => (
                self.members
                    .iter()
                    .enumerate()
                    .filter_map(|(index, member)| Some((index, member.row_key.clone()?)))
                    .collect::<Vec<_>>(),
                &self.scoped_row_key,
            ),
            KeyTarget::PartitionKey => (
                self.members
                    .iter()
                    .enumerate()
                    .filter_map(|(index, member)| Some((index, member.partition_key.clone()?)))
                    .collect::<Vec<_>>(),
                &self.scoped_partition_key,
            ),
        };

        let declared = strategies.len() + scopes.len();
        if declared == 0 {
            let kind = match target {
                KeyTarget::RowKey => ErrorKind::MissingRowKey,
                KeyTarget::PartitionKey => ErrorKind::MissingPartitionKey,
            };
            errors.push(table_error!(
                kind,
                "Entity type declares no key source",
                format!("`{}` has no {target}", self.type_name)
            ));

            return None;
        }
        if declared > 1 {
            errors.push(table_error!(
                ErrorKind::DuplicateKeyRole,
                "Entity type declares more than one key source",
                format!("`{}` has {declared} sources for its {target}", self.type_name)
            ));

            return None;
        }

        if let Some((index, strategy)) = strategies.into_iter().next() {
            if let Err(err) = strategy.validate(self.members[index].info(), target) {
                errors.push(err);
                return None;
            }

            return Some(KeySource::Member { index, strategy });
        }

        let scope = scopes.first()?;
        let mut contributors: Vec<(usize, ScopeContribution)> = self
            .members
            .iter()
            .enumerate()
            .flat_map(|(index, member)| {
                member
                    .scopes
                    .iter()
                    .filter(|contribution| &contribution.scope == scope)
                    .map(move |contribution| (index, contribution.clone()))
            })
            .collect();

        if contributors.is_empty() {
            errors.push(table_error!(
                ErrorKind::InvalidDescriptor,
                "Scoped key has no contributing members",
                format!("scope `{scope}` of `{}`", self.type_name)
            ));

            return None;
        }

        for (index, _) in &contributors {
            if let Err(err) = DirectKey.validate(self.members[*index].info(), target) {
                errors.push(err);
            }
        }

        scoped::sort_contributions(&mut contributors, |(_, contribution)| contribution);

        Some(KeySource::Scoped {
            scope: scope.clone(),
            contributors,
        })
    }

    fn check_orphan_scopes(&self, errors: &mut Vec<TableError>) {
        for member in &self.members {
            for contribution in &member.scopes {
                let declared = self.scoped_row_key.contains(&contribution.scope)
                    || self.scoped_partition_key.contains(&contribution.scope);

                if !declared {
                    errors.push(table_error!(
                        ErrorKind::InvalidDescriptor,
                        "Member contributes to an undeclared scope",
                        format!("member `{}`, scope `{}`", member.name(), contribution.scope)
                    ));
                }
            }
        }
    }

    fn check_storage(&self, errors: &mut Vec<TableError>) {
        let mut stored_names = HashSet::new();
        let mut reserved_prefixes = Vec::new();

        for member in &self.members {
            let Some(codec) = member.storage() else {
                continue;
            };

            if let Err(err) = codec.validate(member.info()) {
                errors.push(err);
            }

            let name = codec.property_name(member.info());
            if RESERVED_PROPERTY_NAMES.contains(&name) {
                errors.push(table_error!(
                    ErrorKind::InvalidDescriptor,
                    "Member is stored under a reserved property name",
                    format!("member `{}` uses `{name}`", member.name())
                ));
            } else if !stored_names.insert(name.to_string()) {
                errors.push(table_error!(
                    ErrorKind::InvalidDescriptor,
                    "Two members are stored under the same property name",
                    format!("property `{name}` of `{}`", self.type_name)
                ));
            }

            if let Some(prefix) = codec.reserved_prefix(member.info()) {
                reserved_prefixes.push((member.name(), prefix));
            }
        }

        for name in &stored_names {
            for (owner, prefix) in &reserved_prefixes {
                if name.starts_with(prefix.as_str()) {
                    errors.push(table_error!(
                        ErrorKind::InvalidDescriptor,
                        "Member is stored under a name reserved for overflow properties",
                        format!("property `{name}` collides with the overflow of `{owner}`")
                    ));
                }
            }
        }
    }

    fn single_role(
        &self,
        role: &str,
        member_type: MemberType,
        has_role: impl Fn(&Member<T>) -> bool,
        errors: &mut Vec<TableError>,
    ) -> Option<usize> {
        let holders: Vec<usize> = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, member)| has_role(member))
            .map(|(index, _)| index)
            .collect();

        if holders.len() > 1 {
            errors.push(table_error!(
                ErrorKind::DuplicateKeyRole,
                "More than one member carries the same role",
                format!("{} members of `{}` carry the {role} role", holders.len(), self.type_name)
            ));
        }

        let index = *holders.first()?;
        let info: &MemberInfo = self.members[index].info();
        if info.member_type != member_type {
            errors.push(table_error!(
                ErrorKind::UnsupportedMemberType,
                "Member type does not fit its role",
                format!("member `{}` carries the {role} role but is {:?}", info.name, info.member_type)
            ));
        }

        Some(index)
    }
}
