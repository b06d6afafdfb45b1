//! Mapping between entity member values and property bag entries.

use std::fmt;

use crate::entity::MemberInfo;
use crate::error::TableResult;
use crate::types::{PropertyBag, Value};

mod overflow;
mod property;

pub use overflow::{
    BINARY_CHUNK_SIZE, OVERFLOW_BINARY_SENTINEL, OVERFLOW_STRING_SENTINEL, OverflowPropertyCodec,
    STRING_CHUNK_UNITS,
};
pub use property::BasePropertyCodec;

/// Converts a single member to and from the properties it is stored as.
pub trait PropertyCodec: fmt::Debug + Send + Sync {
    /// Name of the primary property the member is stored under.
    fn property_name<'a>(&'a self, member: &'a MemberInfo) -> &'a str;

    /// Checks at descriptor build time that the codec can store `member`.
    fn validate(&self, _member: &MemberInfo) -> TableResult<()> {
        Ok(())
    }

    /// Produces the properties for `value`. A null value produces none.
    fn convert_value(&self, value: &Value, member: &MemberInfo) -> TableResult<Vec<(String, Value)>>;

    /// Reads the member value back out of a stored property bag.
    fn member_value(&self, member: &MemberInfo, properties: &PropertyBag) -> TableResult<Value>;

    /// Prefix of the extra property names the codec may write next to the primary one.
    fn reserved_prefix(&self, _member: &MemberInfo) -> Option<String> {
        None
    }

    /// Returns `true` when the stored property can be compared natively in store filters.
    fn filterable(&self) -> bool {
        true
    }
}
