use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings for entity repositories.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryConfig {
    /// How many times an update is re-read and re-applied after losing an etag race.
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,
}

impl RepositoryConfig {
    pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 5;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_update_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "repository.max_update_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: default_max_update_attempts(),
        }
    }
}

fn default_max_update_attempts() -> u32 {
    RepositoryConfig::DEFAULT_MAX_UPDATE_ATTEMPTS
}
