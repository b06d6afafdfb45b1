use std::collections::BTreeMap;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Connection strings keyed by the name jobs use to refer to them.
///
/// Backup jobs only ever store the *name* of a connection; the secret itself lives
/// here and is resolved when the job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionStrings(BTreeMap<String, SerializableSecretString>);

impl ConnectionStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the connection string registered under `name`.
    pub fn with(mut self, name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        self.0.insert(
            name.into(),
            SerializableSecretString::from(connection_string.into()),
        );
        self
    }

    /// Returns the connection string registered under `name`.
    pub fn get(&self, name: &str) -> Result<&SerializableSecretString, ValidationError> {
        self.0
            .get(name)
            .ok_or_else(|| ValidationError::UnknownConnection(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Checks that every connection string starts with one of `schemes`.
    pub fn validate_schemes(&self, schemes: &[&str]) -> Result<(), ValidationError> {
        for (name, connection_string) in &self.0 {
            let value = connection_string.expose_secret();
            if !schemes.iter().any(|scheme| value.starts_with(scheme)) {
                return Err(ValidationError::UnsupportedConnectionScheme {
                    name: name.clone(),
                    expected: schemes.join(", "),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_connections_only() {
        let connections = ConnectionStrings::new().with("primary", "memory://primary");

        assert_eq!(
            connections.get("primary").unwrap().expose_secret(),
            "memory://primary"
        );
        assert!(matches!(
            connections.get("missing"),
            Err(ValidationError::UnknownConnection(name)) if name == "missing"
        ));
    }

    #[test]
    fn rejects_unknown_schemes() {
        let connections = ConnectionStrings::new()
            .with("primary", "memory://primary")
            .with("legacy", "ftp://somewhere");

        assert!(matches!(
            connections.validate_schemes(&["memory://"]),
            Err(ValidationError::UnsupportedConnectionScheme { name, .. }) if name == "legacy"
        ));
    }

    #[test]
    fn connection_strings_are_redacted_in_debug_output() {
        let connections = ConnectionStrings::new().with("primary", "memory://secret-account");

        let rendered = format!("{connections:?}");
        assert!(!rendered.contains("secret-account"));
        assert!(rendered.contains("REDACTED"));
    }
}
