use crate::bail;
use crate::codec::PropertyCodec;
use crate::entity::MemberInfo;
use crate::error::{ErrorKind, TableResult};
use crate::types::{MemberType, PropertyBag, Value};

/// Stores a member as one property named after the member, or after an explicit override.
#[derive(Debug, Clone, Default)]
pub struct BasePropertyCodec {
    name: Option<String>,
}

impl BasePropertyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Checks that a stored value fits the member, widening 32-bit integers into 64-bit members.
    pub(crate) fn coerce(value: Value, member: &MemberInfo) -> TableResult<Value> {
        match (member.member_type, value) {
            (MemberType::Int64, Value::Int32(number)) => Ok(Value::Int64(i64::from(number))),
            (member_type, value) if member_type.accepts(&value) => Ok(value),
            (member_type, value) => bail!(
                ErrorKind::ConversionError,
                "Stored property does not match the member type",
                format!(
                    "member `{}` is declared {member_type:?} but the store holds a {} value",
                    member.name,
                    value.type_name()
                )
            ),
        }
    }
}

impl PropertyCodec for BasePropertyCodec {
    fn property_name<'a>(&'a self, member: &'a MemberInfo) -> &'a str {
        self.name.as_deref().unwrap_or(&member.name)
    }

    fn convert_value(&self, value: &Value, member: &MemberInfo) -> TableResult<Vec<(String, Value)>> {
        if value.is_null() {
            return Ok(vec![]);
        }

        // References are plain GUIDs on the wire, which `Value::Guid` already is.
        let value = Self::coerce(value.clone(), member)?;

        Ok(vec![(self.property_name(member).to_string(), value)])
    }

    fn member_value(&self, member: &MemberInfo, properties: &PropertyBag) -> TableResult<Value> {
        match properties.get(self.property_name(member)) {
            Some(value) => Self::coerce(value.clone(), member),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn null_members_produce_no_property() {
        let member = MemberInfo::new("name", MemberType::String);

        let properties = BasePropertyCodec::new().convert_value(&Value::Null, &member).unwrap();
        assert!(properties.is_empty());
    }

    #[test]
    fn references_are_stored_as_guids_under_the_override() {
        let owner = Uuid::new_v4();
        let member = MemberInfo::new("owner", MemberType::Reference);
        let codec = BasePropertyCodec::named("OwnerId");

        let properties = codec.convert_value(&Value::Guid(owner), &member).unwrap();
        assert_eq!(properties, vec![("OwnerId".to_string(), Value::Guid(owner))]);

        let bag: PropertyBag = properties.into_iter().collect();
        assert_eq!(codec.member_value(&member, &bag).unwrap(), Value::Guid(owner));
    }

    #[test]
    fn mismatched_stored_values_are_rejected() {
        let member = MemberInfo::new("count", MemberType::Int64);
        let mut bag = PropertyBag::new();

        bag.insert("count".into(), Value::Int32(3));
        assert_eq!(
            BasePropertyCodec::new().member_value(&member, &bag).unwrap(),
            Value::Int64(3)
        );

        bag.insert("count".into(), Value::String("3".into()));
        let error = BasePropertyCodec::new().member_value(&member, &bag).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConversionError);
    }
}
