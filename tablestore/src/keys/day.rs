use chrono::{DateTime, Datelike, Utc};

use crate::bail;
use crate::entity::MemberInfo;
use crate::error::{ErrorKind, TableResult};
use crate::keys::{KeyStrategy, KeyTarget};
use crate::types::{MemberType, Value};

/// Key used for missing or default dates.
const DEFAULT_DAY_KEY: &str = "1_1";

/// Partitions rows by the calendar day of a date member, as `{year}_{day_of_year}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayOfYear;

impl DayOfYear {
    pub fn day_key(value: &Value) -> String {
        match value {
            Value::DateTime(when) if !is_default_date(when) => {
                format!("{}_{}", when.year(), when.ordinal())
            }
            _ => DEFAULT_DAY_KEY.to_string(),
        }
    }
}

fn is_default_date(when: &DateTime<Utc>) -> bool {
    when.year() == 1 && when.ordinal() == 1
}

impl KeyStrategy for DayOfYear {
    fn name(&self) -> &'static str {
        "day_of_year"
    }

    fn validate(&self, member: &MemberInfo, target: KeyTarget) -> TableResult<()> {
        if target == KeyTarget::RowKey || member.member_type != MemberType::DateTime {
            bail!(
                ErrorKind::UnsupportedMemberType,
                "Day of year keys need a datetime partition key member",
                format!("member `{}` used as {target}", member.name)
            );
        }

        Ok(())
    }

    fn generate_key(
        &self,
        _row_key: Option<&str>,
        value: &Value,
        _member: &MemberInfo,
    ) -> TableResult<Option<String>> {
        Ok(Some(Self::day_key(value)))
    }

    fn compute_key(
        &self,
        _row_key: Option<&str>,
        _id: &Value,
        member: &MemberInfo,
    ) -> TableResult<Option<String>> {
        bail!(
            ErrorKind::InvalidArgument,
            "Day of year partition keys cannot be computed from an id",
            format!("member `{}`", member.name)
        );
    }

    fn equality_only(&self) -> bool {
        true
    }
}
