use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{BackupConfig, ConnectionStrings, RepositoryConfig, ValidationError};

/// Top-level configuration of the backup worker binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackupWorkerConfig {
    /// Name of the connection holding the backup job records.
    pub control_connection: String,
    /// All connection strings jobs may refer to.
    #[serde(default)]
    pub connection_strings: ConnectionStrings,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
}

impl BackupWorkerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection_strings.get(&self.control_connection)?;
        self.backup.validate()?;
        self.repository.validate()?;

        Ok(())
    }
}

impl Config for BackupWorkerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
