//! Composite keys built from several members.
//!
//! Every contributing member declares the scope it belongs to and a numeric order. The key
//! is the concatenation of the contributors' direct keys in ascending order, separated by
//! [`SCOPE_SEPARATOR`].

use std::cmp::Ordering;

use crate::entity::MemberInfo;
use crate::error::TableResult;
use crate::keys::direct::format_key_value;
use crate::types::Value;

/// Separator between the segments of a scoped key.
pub const SCOPE_SEPARATOR: &str = "___";

/// A member's contribution to a named scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeContribution {
    pub scope: String,
    pub order: f64,
    /// Stops aggregation at this member when its segment is empty.
    pub ignore_rest_when_empty: bool,
}

impl ScopeContribution {
    pub fn new(scope: impl Into<String>, order: f64) -> Self {
        Self {
            scope: scope.into(),
            order,
            ignore_rest_when_empty: false,
        }
    }

    pub fn ignore_rest_when_empty(mut self) -> Self {
        self.ignore_rest_when_empty = true;
        self
    }
}

/// Orders contributions by their declared order, keeping declaration order for ties.
pub fn sort_contributions<T>(items: &mut [T], contribution: impl Fn(&T) -> &ScopeContribution) {
    items.sort_by(|a, b| {
        contribution(a)
            .order
            .partial_cmp(&contribution(b).order)
            .unwrap_or(Ordering::Equal)
    });
}

/// Builds a scoped key from contributions already sorted with [`sort_contributions`].
pub fn aggregate<'a, I>(segments: I) -> TableResult<String>
where
    I: IntoIterator<Item = (&'a ScopeContribution, &'a MemberInfo, &'a Value)>,
{
    let mut parts = Vec::new();

    for (contribution, member, value) in segments {
        let segment = match value {
            Value::Null => String::new(),
            value => format_key_value(value, member)?,
        };

        let stop = segment.is_empty() && contribution.ignore_rest_when_empty;
        parts.push(segment);

        if stop {
            break;
        }
    }

    Ok(parts.join(SCOPE_SEPARATOR))
}
