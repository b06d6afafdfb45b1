use crate::entity::MemberInfo;
use crate::error::TableResult;
use crate::keys::direct::{DirectKey, format_key_value};
use crate::keys::{KeyStrategy, KeyTarget};
use crate::types::Value;

/// Number of partitions hash-remainder keys are spread over.
pub const HASH_PARTITION_COUNT: i32 = 13;

const HASH_SEED: i32 = (5381 << 16) + 5381;
const HASH_LANE_MULTIPLIER: i32 = 1566083941;

/// Partitions rows by the remainder of the legacy string hash of the member value.
///
/// Keys written by earlier deployments depend on the exact hash, so the algorithm must stay
/// bit-for-bit identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashRemainder;

impl HashRemainder {
    pub fn partition_of(key: &str) -> i32 {
        legacy_string_hash(key).rem_euclid(HASH_PARTITION_COUNT)
    }
}

impl KeyStrategy for HashRemainder {
    fn name(&self) -> &'static str {
        "hash_remainder"
    }

    fn validate(&self, member: &MemberInfo, target: KeyTarget) -> TableResult<()> {
        DirectKey.validate(member, target)
    }

    fn generate_key(
        &self,
        _row_key: Option<&str>,
        value: &Value,
        member: &MemberInfo,
    ) -> TableResult<Option<String>> {
        if value.is_null() {
            return Ok(None);
        }

        let formatted = format_key_value(value, member)?;
        Ok(Some(Self::partition_of(&formatted).to_string()))
    }
}

/// 32-bit string hash over the UTF-16 code units of `value`.
///
/// Two lanes consume little-endian pairs of code units from the zero-terminated string in
/// alternation and are combined at the end. All arithmetic wraps and shifts are arithmetic.
pub fn legacy_string_hash(value: &str) -> i32 {
    let mut units: Vec<u16> = value.encode_utf16().collect();
    let len = units.len();
    // Terminator plus padding so that every word read below stays in bounds.
    units.extend([0u16; 4]);

    let word = |index: usize| (u32::from(units[index]) | (u32::from(units[index + 1]) << 16)) as i32;

    let mut hash1 = HASH_SEED;
    let mut hash2 = HASH_SEED;
    let mut remaining = len as isize;
    let mut index = 0;

    while remaining > 2 {
        hash1 = scramble(hash1) ^ word(index);
        hash2 = scramble(hash2) ^ word(index + 2);
        index += 4;
        remaining -= 4;
    }

    if remaining > 0 {
        hash1 = scramble(hash1) ^ word(index);
    }

    hash1.wrapping_add(hash2.wrapping_mul(HASH_LANE_MULTIPLIER))
}

fn scramble(hash: i32) -> i32 {
    (hash << 5).wrapping_add(hash).wrapping_add(hash >> 27)
}
