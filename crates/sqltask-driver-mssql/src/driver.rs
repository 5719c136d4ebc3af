//! MS SQL Server driver implementation

use crate::connection::MssqlConnection;
use async_trait::async_trait;
use sqltask_core::{Connection, ConnectionConfig, ConnectionFactory, Result};

/// MS SQL Server database driver
///
/// Opens one unpooled tiberius session per call to `connect`.
pub struct MssqlDriver;

impl MssqlDriver {
    /// Create a new MS SQL Server driver instance
    pub fn new() -> Self {
        tracing::debug!("MS SQL Server driver initialized");
        Self
    }

    pub fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    pub fn default_port(&self) -> u16 {
        1433
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MssqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlDriver").finish()
    }
}

#[async_trait]
impl ConnectionFactory for MssqlDriver {
    fn id(&self) -> &'static str {
        "mssql"
    }

    #[tracing::instrument(skip(self, config), fields(target = %config.describe(), user = config.username.as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        tracing::debug!("connecting to MS SQL Server");
        let connection = MssqlConnection::from_config(config).await?;
        Ok(Box::new(connection))
    }

    async fn flush_pool(&self) {
        // Sessions are never reused, so there is nothing idle to discard.
        tracing::trace!("no pooled MS SQL Server sessions to flush");
    }
}
