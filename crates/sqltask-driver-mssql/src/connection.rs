//! MS SQL Server connection implementation using tiberius

use async_trait::async_trait;
use sqltask_core::{
    BulkLoadPlan, Connection, NativeIsolation, QueryResult, Result, SqlParam, SqlTaskError,
    StatementResult, Transaction,
};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::convert::{TiberiusParam, params_to_tiberius, rows_to_query_result};
use crate::dialect::MssqlDialect;
use crate::transaction::MssqlTransaction;

/// Server error number for a rejected login
const LOGIN_FAILED: u32 = 18456;

pub(crate) type MssqlClient = Client<Compat<TcpStream>>;

/// The client shared between a connection and its open transaction.
///
/// `None` once the connection has been closed.
pub(crate) type SharedClient = Arc<Mutex<Option<MssqlClient>>>;

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid connection configuration: {0}")]
    InvalidConfig(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Driver aborted: {0}")]
    DriverPanic(String),

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MssqlConnectionError {
    /// Classify an error raised while opening a session
    fn from_connect(err: tiberius::error::Error) -> Self {
        match &err {
            tiberius::error::Error::Server(token) if token.code() == LOGIN_FAILED => {
                Self::AuthenticationFailed(token.message().to_string())
            }
            _ => Self::ConnectionFailed(err.to_string()),
        }
    }
}

impl From<MssqlConnectionError> for SqlTaskError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionFailed(msg) => SqlTaskError::Connection(msg),
            MssqlConnectionError::AuthenticationFailed(msg) => SqlTaskError::Authentication(msg),
            MssqlConnectionError::InvalidConfig(msg) => SqlTaskError::Configuration(msg),
            MssqlConnectionError::QueryFailed(msg) => SqlTaskError::Query(msg),
            MssqlConnectionError::TypeConversion(msg) => SqlTaskError::Binding(msg),
            MssqlConnectionError::ConnectionClosed => {
                SqlTaskError::Connection("connection is closed".to_string())
            }
            MssqlConnectionError::DriverPanic(msg) => SqlTaskError::Driver(msg),
            MssqlConnectionError::Tiberius(e) => match e {
                tiberius::error::Error::Server(token) => {
                    SqlTaskError::Query(format!("{} (error {})", token.message(), token.code()))
                }
                tiberius::error::Error::Io { .. } | tiberius::error::Error::Tls(_) => {
                    SqlTaskError::Connection(e.to_string())
                }
                tiberius::error::Error::Conversion(_) | tiberius::error::Error::BulkInput(_) => {
                    SqlTaskError::Binding(e.to_string())
                }
                other => SqlTaskError::Driver(other.to_string()),
            },
            MssqlConnectionError::Io(e) => SqlTaskError::Connection(e.to_string()),
        }
    }
}

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    client: SharedClient,
    closed: AtomicBool,
    database: Option<String>,
    dialect: MssqlDialect,
}

impl MssqlConnection {
    /// Open a connection from a prepared tiberius configuration
    #[tracing::instrument(skip(config), fields(addr = %config.get_addr()))]
    pub async fn connect(config: Config) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to MS SQL Server");

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(MssqlConnectionError::from_connect)?;

        tracing::debug!("successfully connected to MS SQL Server");

        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
            closed: AtomicBool::new(false),
            database: None,
            dialect: MssqlDialect::new(),
        })
    }

    /// Create connection from config with standard keys.
    ///
    /// A connection string takes precedence over the discrete fields.
    pub async fn from_config(
        config: &sqltask_core::ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let tiberius_config = build_config(config)?;
        let mut connection = Self::connect(tiberius_config).await?;
        connection.database = config.get_string("database");
        Ok(connection)
    }

    pub(crate) fn shared_client(&self) -> SharedClient {
        Arc::clone(&self.client)
    }

    pub(crate) fn dialect(&self) -> &MssqlDialect {
        &self.dialect
    }
}

/// Build a tiberius configuration from a connection target
pub(crate) fn build_config(
    config: &sqltask_core::ConnectionConfig,
) -> std::result::Result<Config, MssqlConnectionError> {
    if let Some(conn_str) = config.connection_string.as_deref() {
        return Config::from_ado_string(conn_str)
            .map_err(|e| MssqlConnectionError::InvalidConfig(e.to_string()));
    }

    let host = config
        .get_string("host")
        .unwrap_or_else(|| "localhost".to_string());
    let port = if config.port > 0 { config.port } else { 1433 };
    let username = config
        .get_string("user")
        .or_else(|| config.get_string("username"));
    let password = config.get_string("password");

    let mut tiberius_config = Config::new();
    tiberius_config.host(&host);
    tiberius_config.port(port);
    if let Some(db) = config.get_string("database") {
        tiberius_config.database(db);
    }
    if config.get_bool("trust_cert") || config.get_bool("trust_certificate") {
        tiberius_config.trust_cert();
    }
    tiberius_config.encryption(EncryptionLevel::Required);

    match username {
        Some(user) => {
            tiberius_config.authentication(AuthMethod::sql_server(
                user,
                password.unwrap_or_default(),
            ));
        }
        None => {
            #[cfg(windows)]
            {
                tiberius_config.authentication(AuthMethod::Integrated);
            }
            #[cfg(not(windows))]
            {
                return Err(MssqlConnectionError::AuthenticationFailed(
                    "Windows authentication is only supported on Windows".to_string(),
                ));
            }
        }
    }

    Ok(tiberius_config)
}

/// Borrow converted parameters as tiberius expects them
pub(crate) fn param_refs(params: &[TiberiusParam]) -> Vec<&dyn tiberius::ToSql> {
    params.iter().map(|p| p as &dyn tiberius::ToSql).collect()
}

/// Await a driver future, turning a panic inside tiberius into an error.
///
/// The outer `Err` means the future panicked. The client it was using is left
/// mid-stream, so callers drop it instead of issuing more requests on it.
/// tiberius aborts this way on user-defined type metadata such as
/// `geometry` and `geography` columns.
pub(crate) async fn catch_driver_panic<T, E, F>(
    operation: &str,
    fut: F,
) -> std::result::Result<std::result::Result<T, E>, MssqlConnectionError>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(operation, detail = %detail, "driver panicked");
        MssqlConnectionError::DriverPanic(format!(
            "{} aborted inside the driver ({}). Columns of user-defined types such as \
             geometry and geography cannot be read; CAST them in the statement, \
             for example col.STAsText() or CAST(col AS varbinary(max))",
            operation, detail
        ))
    })
}

/// Run a statement on a locked client and sum the affected counts
pub(crate) async fn execute_on(
    client: &mut MssqlClient,
    sql: &str,
    params: &[SqlParam],
) -> std::result::Result<u64, MssqlConnectionError> {
    let tiberius_params = params_to_tiberius(params)?;
    let result = client.execute(sql, &param_refs(&tiberius_params)).await?;
    Ok(result.rows_affected().iter().sum::<u64>())
}

/// Run a statement on a locked client and collect every result set
pub(crate) async fn query_on(
    client: &mut MssqlClient,
    sql: &str,
    params: &[SqlParam],
) -> std::result::Result<Vec<QueryResult>, MssqlConnectionError> {
    let tiberius_params = params_to_tiberius(params)?;
    let stream = client.query(sql, &param_refs(&tiberius_params)).await?;
    let sets = stream.into_results().await?;
    sets.into_iter().map(rows_to_query_result).collect()
}

impl MssqlConnection {
    fn exec_procedure_sql(&self, procedure: &str, params: &[SqlParam]) -> Result<String> {
        let names = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.name.as_deref().ok_or_else(|| {
                    SqlTaskError::Binding(format!(
                        "parameter {} of procedure {} has no name",
                        i + 1,
                        procedure
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.dialect.exec_procedure(procedure, &names))
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<StatementResult> {
        let start = std::time::Instant::now();
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

        let outcome = match catch_driver_panic("execute", execute_on(client, sql, params)).await {
            Ok(outcome) => outcome,
            Err(panicked) => {
                guard.take();
                Err(panicked)
            }
        };

        match outcome {
            Ok(affected_rows) => {
                tracing::debug!(
                    affected_rows = affected_rows,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "execute completed"
                );
                Ok(StatementResult { affected_rows })
            }
            Err(e) => {
                tracing::error!(error = %e, "execute failed");
                Err(e.into())
            }
        }
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<QueryResult>> {
        let start = std::time::Instant::now();
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

        let outcome = match catch_driver_panic("query", query_on(client, sql, params)).await {
            Ok(outcome) => outcome,
            Err(panicked) => {
                guard.take();
                Err(panicked)
            }
        };

        match outcome {
            Ok(mut results) => {
                let execution_time_ms = start.elapsed().as_millis() as u64;
                for result in &mut results {
                    result.execution_time_ms = execution_time_ms;
                }
                tracing::debug!(
                    result_sets = results.len(),
                    row_count = results.iter().map(|r| r.row_count()).sum::<usize>(),
                    duration_ms = execution_time_ms,
                    "query completed"
                );
                Ok(results)
            }
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                Err(e.into())
            }
        }
    }

    async fn execute_procedure(
        &self,
        procedure: &str,
        params: &[SqlParam],
    ) -> Result<StatementResult> {
        let sql = self.exec_procedure_sql(procedure, params)?;
        tracing::debug!(procedure, sql = %sql, "executing stored procedure");
        self.execute(&sql, params).await
    }

    async fn query_procedure(
        &self,
        procedure: &str,
        params: &[SqlParam],
    ) -> Result<Vec<QueryResult>> {
        let sql = self.exec_procedure_sql(procedure, params)?;
        tracing::debug!(procedure, sql = %sql, "querying stored procedure");
        self.query(&sql, params).await
    }

    async fn bulk_load(
        &self,
        plan: &BulkLoadPlan,
        progress: &mut (dyn FnMut(u64) + Send),
    ) -> Result<u64> {
        crate::bulk::bulk_load(self, plan, progress).await
    }

    async fn begin_transaction(&self, isolation: NativeIsolation) -> Result<Box<dyn Transaction>> {
        let transaction = MssqlTransaction::begin(self.shared_client(), isolation).await?;
        Ok(Box::new(transaction))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client
                .close()
                .await
                .map_err(|e| SqlTaskError::Connection(e.to_string()))?;
        }
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
