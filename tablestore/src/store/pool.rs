use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use config::SerializableSecretString;
use config::shared::ConnectionStrings;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, TableResult};
use crate::store::{MemoryStorageAccount, StorageAccount, TableClient};

/// Connection string scheme served by [`MemoryConnector`].
pub const MEMORY_SCHEME: &str = "memory";

/// Opens storage accounts for connection strings of one scheme.
pub trait StoreConnector: fmt::Debug + Send + Sync {
    /// Scheme handled by this connector, without the `://` separator.
    fn scheme(&self) -> &str;

    fn connect(&self, connection_string: &str) -> TableResult<Arc<dyn StorageAccount>>;
}

/// Connects `memory://{name}` connection strings to fresh in-memory accounts.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryConnector;

impl StoreConnector for MemoryConnector {
    fn scheme(&self) -> &str {
        MEMORY_SCHEME
    }

    fn connect(&self, connection_string: &str) -> TableResult<Arc<dyn StorageAccount>> {
        let name = connection_string
            .split_once("://")
            .map(|(_, name)| name)
            .unwrap_or_default();

        Ok(Arc::new(MemoryStorageAccount::new(name)))
    }
}

/// Process-wide cache of storage accounts keyed by connection string.
///
/// Each connection string is connected once and the account reused afterwards. The pool is
/// created at startup and passed to whoever needs store access.
#[derive(Debug, Default)]
pub struct TableClientPool {
    connectors: Vec<Arc<dyn StoreConnector>>,
    accounts: Mutex<HashMap<String, Arc<dyn StorageAccount>>>,
}

impl TableClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connector(mut self, connector: impl StoreConnector + 'static) -> Self {
        self.connectors.push(Arc::new(connector));
        self
    }

    /// Registers an already connected account, for example one shared with test code.
    pub async fn register(&self, connection_string: &str, account: Arc<dyn StorageAccount>) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(connection_string.to_string(), account);
    }

    /// Returns the account for `connection_string`, connecting on first use.
    pub async fn account(
        &self,
        connection_string: &SerializableSecretString,
    ) -> TableResult<Arc<dyn StorageAccount>> {
        let connection_string = connection_string.expose_secret();

        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get(connection_string) {
            return Ok(account.clone());
        }

        let scheme = connection_string
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or_default();
        let Some(connector) = self
            .connectors
            .iter()
            .find(|connector| connector.scheme() == scheme)
        else {
            bail!(
                ErrorKind::ConnectionFailed,
                "No connector handles the connection string scheme",
                format!("scheme `{scheme}`")
            );
        };

        let account = connector.connect(connection_string)?;
        info!(scheme, "connected to storage account");
        accounts.insert(connection_string.clone(), account.clone());

        Ok(account)
    }

    /// Resolves a named connection and returns its account.
    pub async fn named_account(
        &self,
        connections: &ConnectionStrings,
        name: &str,
    ) -> TableResult<Arc<dyn StorageAccount>> {
        let connection_string = connections.get(name)?;

        self.account(connection_string).await
    }

    /// Returns a client for `table` on the named connection.
    pub async fn table(
        &self,
        connections: &ConnectionStrings,
        name: &str,
        table: &str,
    ) -> TableResult<Arc<dyn TableClient>> {
        Ok(self.named_account(connections, name).await?.table(table))
    }
}
