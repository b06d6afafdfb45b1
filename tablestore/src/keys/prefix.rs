use crate::bail;
use crate::entity::MemberInfo;
use crate::error::{ErrorKind, TableResult};
use crate::keys::direct::format_key_value;
use crate::keys::{KeyStrategy, KeyTarget};
use crate::types::{MemberType, Value};

/// Partition key returned when the prefix length is not positive.
const EMPTY_PREFIX_KEY: &str = "-";

/// Default number of row key characters forming the partition key.
pub const DEFAULT_PREFIX_CHARACTERS: i32 = 2;

/// Partitions rows by the first characters of their row key.
#[derive(Debug, Clone, Copy)]
pub struct RowKeyPrefix {
    characters: i32,
}

impl RowKeyPrefix {
    pub fn new(characters: i32) -> Self {
        Self { characters }
    }

    pub fn characters(&self) -> i32 {
        self.characters
    }

    /// Returns the partition key of `row_key`, or [`None`] when there is no row key.
    pub fn prefix_of(&self, row_key: Option<&str>) -> Option<String> {
        let row_key = row_key.filter(|key| !key.is_empty())?;

        if self.characters <= 0 {
            return Some(EMPTY_PREFIX_KEY.to_string());
        }

        Some(row_key.chars().take(self.characters as usize).collect())
    }

    /// Computes the partition key of an entity whose row key is the direct key of `id`.
    ///
    /// Lookups by id use this before any entity has been loaded.
    pub fn lookup_partition_key(id: &Value, member_type: MemberType) -> TableResult<Option<String>> {
        let member = MemberInfo::new("id", member_type);
        let row_key = format_key_value(id, &member)?;

        Ok(RowKeyPrefix::default().prefix_of(Some(&row_key)))
    }
}

impl Default for RowKeyPrefix {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX_CHARACTERS)
    }
}

impl KeyStrategy for RowKeyPrefix {
    fn name(&self) -> &'static str {
        "row_key_prefix"
    }

    fn validate(&self, member: &MemberInfo, target: KeyTarget) -> TableResult<()> {
        if target == KeyTarget::RowKey {
            bail!(
                ErrorKind::InvalidDescriptor,
                "Row key prefix can only produce partition keys",
                format!("member `{}`", member.name)
            );
        }

        Ok(())
    }

    fn generate_key(
        &self,
        row_key: Option<&str>,
        _value: &Value,
        _member: &MemberInfo,
    ) -> TableResult<Option<String>> {
        Ok(self.prefix_of(row_key))
    }

    fn derives_from_row_key(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn prefixes_take_leading_characters() {
        let member = MemberInfo::new("id", MemberType::Guid);
        let strategy = RowKeyPrefix::new(3);

        let key = strategy
            .generate_key(Some("3fa85f6457174562b3fc2c963f66afa6"), &Value::Null, &member)
            .unwrap();
        assert_eq!(key.as_deref(), Some("3fa"));
    }

    #[test]
    fn missing_row_keys_and_empty_prefixes() {
        assert_eq!(RowKeyPrefix::default().prefix_of(None), None);
        assert_eq!(RowKeyPrefix::default().prefix_of(Some("")), None);
        assert_eq!(RowKeyPrefix::new(0).prefix_of(Some("abc")).as_deref(), Some("-"));
        assert_eq!(RowKeyPrefix::new(-4).prefix_of(Some("abc")).as_deref(), Some("-"));
        assert_eq!(RowKeyPrefix::new(10).prefix_of(Some("abc")).as_deref(), Some("abc"));
    }

    #[test]
    fn lookup_uses_the_direct_key_of_the_id() {
        let id = Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap();

        let key = RowKeyPrefix::lookup_partition_key(&Value::Guid(id), MemberType::Reference).unwrap();
        assert_eq!(key.as_deref(), Some("3f"));
    }

    #[test]
    fn rejected_as_row_key() {
        let member = MemberInfo::new("id", MemberType::Guid);

        let error = RowKeyPrefix::default()
            .validate(&member, KeyTarget::RowKey)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidDescriptor);
    }
}
