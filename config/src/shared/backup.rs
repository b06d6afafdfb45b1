use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Budgets and retry settings for a single backup invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackupConfig {
    /// Wall-clock budget of one invocation, checked between segment reads.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    /// Row budget of one invocation, checked between segment reads.
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,
    /// Maximum number of operations in one destination batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of rows requested per source segment.
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,
    /// Delay before the first retry of a timed out store call.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    /// Amount added to the delay after every further timeout.
    #[serde(default = "default_retry_delay_increment_ms")]
    pub retry_delay_increment_ms: u64,
}

impl BackupConfig {
    pub const DEFAULT_MAX_DURATION_MS: u64 = 90_000;

    pub const DEFAULT_MAX_ROWS: u64 = 150_000;

    /// Largest batch accepted by the table store.
    pub const MAX_BATCH_SIZE: usize = 100;

    pub const DEFAULT_SEGMENT_SIZE: usize = 1_000;

    pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 1_000;

    pub const DEFAULT_RETRY_DELAY_INCREMENT_MS: u64 = 1_000;

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn retry_delay_increment(&self) -> Duration {
        Duration::from_millis(self.retry_delay_increment_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > Self::MAX_BATCH_SIZE {
            return Err(ValidationError::InvalidFieldValue {
                field: "backup.batch_size".to_string(),
                constraint: format!("must be between 1 and {}", Self::MAX_BATCH_SIZE),
            });
        }

        if self.segment_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "backup.segment_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_rows == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "backup.max_rows".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: default_max_duration_ms(),
            max_rows: default_max_rows(),
            batch_size: default_batch_size(),
            segment_size: default_segment_size(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_delay_increment_ms: default_retry_delay_increment_ms(),
        }
    }
}

fn default_max_duration_ms() -> u64 {
    BackupConfig::DEFAULT_MAX_DURATION_MS
}

fn default_max_rows() -> u64 {
    BackupConfig::DEFAULT_MAX_ROWS
}

fn default_batch_size() -> usize {
    BackupConfig::MAX_BATCH_SIZE
}

fn default_segment_size() -> usize {
    BackupConfig::DEFAULT_SEGMENT_SIZE
}

fn default_retry_initial_delay_ms() -> u64 {
    BackupConfig::DEFAULT_RETRY_INITIAL_DELAY_MS
}

fn default_retry_delay_increment_ms() -> u64 {
    BackupConfig::DEFAULT_RETRY_DELAY_INCREMENT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: BackupConfig = serde_json::from_str(r#"{ "max_rows": 10 }"#).unwrap();

        assert_eq!(config.max_rows, 10);
        assert_eq!(config.max_duration(), Duration::from_secs(90));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.retry_initial_delay(), Duration::from_secs(1));
        assert_eq!(config.retry_delay_increment(), Duration::from_secs(1));
    }

    #[test]
    fn batch_size_is_bounded_by_the_store_limit() {
        let config = BackupConfig {
            batch_size: 101,
            ..BackupConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BackupConfig {
            batch_size: 0,
            ..BackupConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(BackupConfig::default().validate().is_ok());
    }
}
