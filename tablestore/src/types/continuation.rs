use serde::{Deserialize, Serialize};

use crate::error::TableResult;

/// Position from which a segmented query resumes.
///
/// The token is store-native: application code persists it as an opaque string with
/// [`ContinuationToken::encode`] and hands it back with [`ContinuationToken::decode`],
/// never inspecting its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

impl ContinuationToken {
    pub fn new(next_partition_key: impl Into<String>, next_row_key: impl Into<String>) -> Self {
        Self {
            next_partition_key: next_partition_key.into(),
            next_row_key: next_row_key.into(),
        }
    }

    pub fn encode(&self) -> TableResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(encoded: &str) -> TableResult<Self> {
        Ok(serde_json::from_str(encoded)?)
    }

    /// Decodes a persisted token field where the empty string means "no token".
    pub fn decode_optional(encoded: &str) -> TableResult<Option<Self>> {
        if encoded.is_empty() {
            return Ok(None);
        }

        Self::decode(encoded).map(Some)
    }

    /// Encodes an optional token, writing the empty string for "no token".
    pub fn encode_optional(token: Option<&Self>) -> TableResult<String> {
        match token {
            Some(token) => token.encode(),
            None => Ok(String::new()),
        }
    }
}
