use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entity::{Entity, EntityDescriptor};
use crate::error::{ErrorKind, TableResult};
use crate::keys::KeyTarget;
use crate::table_error;
use crate::types::{PropertyBag, TableRow, Value};

/// An entity together with the store metadata it was read with.
///
/// Keys are always computed from the current member values. The timestamp and etag live in
/// the members carrying those roles, or in the wrapper when no member does.
#[derive(Debug, Clone)]
pub struct TableEntity<T: Entity> {
    descriptor: Arc<EntityDescriptor<T>>,
    entity: T,
    timestamp: Option<DateTime<Utc>>,
    etag: Option<String>,
}

impl<T: Entity> TableEntity<T> {
    pub fn new(descriptor: Arc<EntityDescriptor<T>>, entity: T) -> Self {
        Self {
            descriptor,
            entity,
            timestamp: None,
            etag: None,
        }
    }

    /// Materializes the entity stored in `row`.
    pub fn read_entity(descriptor: Arc<EntityDescriptor<T>>, row: &TableRow) -> TableResult<Self>
    where
        T: Default,
    {
        let entity = descriptor.read_row(row)?;

        Ok(Self {
            descriptor,
            entity,
            timestamp: row.timestamp,
            etag: row.etag.clone(),
        })
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor<T>> {
        &self.descriptor
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut T {
        &mut self.entity
    }

    pub fn into_inner(self) -> T {
        self.entity
    }

    pub fn row_key(&self) -> TableResult<Option<String>> {
        self.descriptor.row_key(&self.entity)
    }

    pub fn partition_key(&self) -> TableResult<Option<String>> {
        let row_key = self.row_key()?;
        self.descriptor.partition_key(&self.entity, row_key.as_deref())
    }

    /// Parses `row_key` back into the member it is generated from.
    pub fn set_row_key(&mut self, row_key: &str) -> TableResult<()> {
        self.descriptor
            .apply_key(&mut self.entity, KeyTarget::RowKey, row_key)
    }

    /// Parses `partition_key` back into the member it is generated from, where reversible.
    pub fn set_partition_key(&mut self, partition_key: &str) -> TableResult<()> {
        self.descriptor
            .apply_key(&mut self.entity, KeyTarget::PartitionKey, partition_key)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.descriptor.timestamp_member() {
            Some(member) => match member.get(&self.entity) {
                Value::DateTime(timestamp) => Some(timestamp),
                _ => None,
            },
            None => self.timestamp,
        }
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) -> TableResult<()> {
        self.timestamp = Some(timestamp);
        self.descriptor.set_timestamp(&mut self.entity, timestamp)
    }

    pub fn etag(&self) -> Option<String> {
        match self.descriptor.etag_member() {
            Some(member) => match member.get(&self.entity) {
                Value::String(etag) => Some(etag),
                _ => None,
            },
            None => self.etag.clone(),
        }
    }

    pub fn set_etag(&mut self, etag: &str) -> TableResult<()> {
        self.etag = Some(etag.to_string());
        self.descriptor.set_etag(&mut self.entity, etag)
    }

    pub fn properties(&self) -> TableResult<PropertyBag> {
        self.descriptor.write_properties(&self.entity)
    }

    /// Converts the entity into the row layout of the store.
    ///
    /// An entity without a row key cannot be written. A missing partition key is stored as
    /// the empty string.
    pub fn write_entity(&self) -> TableResult<TableRow> {
        let row_key = self.row_key()?.ok_or_else(|| {
            table_error!(
                ErrorKind::InvalidData,
                "Entity has no row key",
                format!("entity type `{}`", self.descriptor.type_name())
            )
        })?;
        let partition_key = self
            .descriptor
            .partition_key(&self.entity, Some(&row_key))?
            .unwrap_or_default();

        Ok(TableRow {
            partition_key,
            row_key,
            timestamp: self.timestamp(),
            etag: self.etag(),
            properties: self.properties()?,
        })
    }

    /// Takes over the server metadata of a row this entity was just written as.
    pub(crate) fn apply_written(&mut self, row: &TableRow) -> TableResult<()> {
        if let Some(timestamp) = row.timestamp {
            self.set_timestamp(timestamp)?;
        }
        if let Some(etag) = &row.etag {
            self.set_etag(etag)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::entity::Member;
    use crate::keys::{DirectKey, RowKeyPrefix};
    use crate::types::MemberType;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tag {
        id: Uuid,
        label: String,
        version: Option<String>,
    }

    fn descriptor(with_etag_member: bool) -> Arc<EntityDescriptor<Tag>> {
        let mut version = Member::optional_field(
            "version",
            MemberType::String,
            |t: &Tag| t.version.clone(),
            |t, v| t.version = v,
        );
        if with_etag_member {
            version = version.etag();
        }

        Arc::new(
            EntityDescriptor::builder("Tag")
                .member(
                    Member::field("id", MemberType::Guid, |t: &Tag| t.id, |t, v| t.id = v)
                        .row_key(DirectKey)
                        .partition_key(RowKeyPrefix::new(1)),
                )
                .member(
                    Member::field("label", MemberType::String, |t: &Tag| t.label.clone(), |t, v| t.label = v)
                        .property(),
                )
                .member(version)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn writes_and_reads_rows() {
        let tag = Tag {
            id: Uuid::from_u128(0xabc),
            label: "blue".into(),
            version: None,
        };
        let entity = TableEntity::new(descriptor(false), tag.clone());

        let mut row = entity.write_entity().unwrap();
        assert_eq!(row.row_key, "00000000000000000000000000000abc");
        assert_eq!(row.partition_key, "0");
        assert_eq!(row.properties.get("label"), Some(&Value::from("blue")));

        row.etag = Some("W/\"3\"".into());
        row.timestamp = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let read = TableEntity::read_entity(descriptor(false), &row).unwrap();

        assert_eq!(read.entity(), &tag);
        assert_eq!(read.etag().as_deref(), Some("W/\"3\""));
        assert_eq!(read.timestamp(), row.timestamp);
    }

    #[test]
    fn etag_members_receive_the_store_etag() {
        let mut entity = TableEntity::new(descriptor(true), Tag::default());

        entity.set_etag("W/\"9\"").unwrap();
        assert_eq!(entity.entity().version.as_deref(), Some("W/\"9\""));
        assert_eq!(entity.etag().as_deref(), Some("W/\"9\""));
    }

    #[test]
    fn setting_the_row_key_updates_the_member() {
        let mut entity = TableEntity::new(descriptor(false), Tag::default());

        entity.set_row_key("00000000000000000000000000000abc").unwrap();
        entity.set_partition_key("0").unwrap();

        assert_eq!(entity.entity().id, Uuid::from_u128(0xabc));
        assert_eq!(entity.partition_key().unwrap().as_deref(), Some("0"));
    }
}
