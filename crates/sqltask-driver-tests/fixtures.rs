//! Shared fixtures for the live test suite
//!
//! Each test works in its own scratch table so tests can run concurrently
//! against one server.

use anyhow::{Context, Result};
use sqltask_core::{Connection, ConnectionConfig, ConnectionFactory};
use sqltask_driver_mssql::MssqlDriver;
use sqltask_engine::{
    CancellationToken, EngineSettings, ExecutionRequest, ExecutionResult, TaskError, TaskRunner,
};

/// Environment variable holding the ADO connection string of the test server
pub const MSSQL_URL_VAR: &str = "SQLTASK_MSSQL_URL";

/// Connection target of the test server, if one is configured
pub fn live_target() -> Option<ConnectionConfig> {
    initialize_logging();
    match std::env::var(MSSQL_URL_VAR) {
        Ok(url) if !url.trim().is_empty() => Some(ConnectionConfig::from_connection_string(url)),
        _ => {
            tracing::warn!("{} not set, skipping live test", MSSQL_URL_VAR);
            None
        }
    }
}

/// Open a direct driver connection for setup and verification
pub async fn test_connection(target: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    MssqlDriver::new()
        .connect(target)
        .await
        .context("failed to connect to the test server")
}

/// Run a request through a runner with default settings
pub async fn run(request: &ExecutionRequest) -> std::result::Result<ExecutionResult, TaskError> {
    TaskRunner::mssql(EngineSettings::default())
        .run(request, CancellationToken::new())
        .await
}

/// A uniquely named table that is dropped by [`ScratchTable::drop`]
pub struct ScratchTable {
    pub name: String,
}

impl ScratchTable {
    /// Create `dbo.sqltask_<random>` with the given column definitions
    pub async fn create(conn: &dyn Connection, columns: &str) -> Result<Self> {
        let name = format!("dbo.sqltask_{}", uuid::Uuid::new_v4().simple());
        conn.execute(&format!("CREATE TABLE {} ({})", name, columns), &[])
            .await
            .with_context(|| format!("failed to create {}", name))?;
        Ok(Self { name })
    }

    pub async fn count(&self, conn: &dyn Connection) -> Result<i64> {
        let sets = conn
            .query(&format!("SELECT COUNT(*) FROM {}", self.name), &[])
            .await?;
        sets.first()
            .and_then(|set| set.rows.first())
            .and_then(|row| row.get(0))
            .and_then(|value| value.as_i64())
            .context("missing count")
    }

    pub async fn drop(self, conn: &dyn Connection) -> Result<()> {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", self.name), &[])
            .await?;
        Ok(())
    }
}

fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sqltask_engine=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
