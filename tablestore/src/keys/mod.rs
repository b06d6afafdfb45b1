//! Strategies deriving row keys and partition keys from entity member values.
//!
//! A strategy is attached to one member of an entity descriptor and is asked for the key
//! whenever the entity is written, for the member value whenever a stored key is read
//! back, and for a key computed from an id alone when looking an entity up before it has
//! been loaded. Composite keys spanning several members are handled by [`scoped`].

use std::fmt;

use crate::entity::MemberInfo;
use crate::error::TableResult;
use crate::types::Value;

mod day;
mod direct;
mod hash;
mod prefix;
pub mod scoped;

pub use day::DayOfYear;
pub use direct::{DirectKey, format_key_value, parse_key_value, sanitize_key};
pub use hash::{HASH_PARTITION_COUNT, HashRemainder, legacy_string_hash};
pub use prefix::RowKeyPrefix;
pub use scoped::{SCOPE_SEPARATOR, ScopeContribution};

/// Which of the two identity keys a strategy is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    RowKey,
    PartitionKey,
}

impl KeyTarget {
    pub fn property_name(&self) -> &'static str {
        match self {
            KeyTarget::RowKey => "RowKey",
            KeyTarget::PartitionKey => "PartitionKey",
        }
    }
}

impl fmt::Display for KeyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property_name())
    }
}

/// Derives a stored key from a member value and, where possible, the value from the key.
pub trait KeyStrategy: fmt::Debug + Send + Sync {
    /// Short name used in logs and error details.
    fn name(&self) -> &'static str;

    /// Checks, once at descriptor build time, that the strategy can serve `member` as `target`.
    fn validate(&self, _member: &MemberInfo, _target: KeyTarget) -> TableResult<()> {
        Ok(())
    }

    /// Generates the key for the current member value.
    ///
    /// `row_key` is the already generated row key when producing a partition key. A result of
    /// [`None`] means no key can be derived from this input.
    fn generate_key(
        &self,
        row_key: Option<&str>,
        value: &Value,
        member: &MemberInfo,
    ) -> TableResult<Option<String>>;

    /// Recovers the member value from a stored key, or [`None`] if the key is not reversible.
    fn parse_key(&self, _key: &str, _member: &MemberInfo) -> TableResult<Option<Value>> {
        Ok(None)
    }

    /// Computes the key from an id alone, before any entity has been materialized.
    fn compute_key(
        &self,
        row_key: Option<&str>,
        id: &Value,
        member: &MemberInfo,
    ) -> TableResult<Option<String>> {
        self.generate_key(row_key, id, member)
    }

    /// Returns `true` when the key is a function of the row key rather than of the member value.
    fn derives_from_row_key(&self) -> bool {
        false
    }

    /// Returns `true` when filters on the member can only ever be equality comparisons.
    fn equality_only(&self) -> bool {
        false
    }
}
