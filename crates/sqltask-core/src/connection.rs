//! Connection trait and transaction handling

use crate::{
    BulkLoadPlan, NativeIsolation, QueryResult, Result, SqlParam, SqlTaskError, StatementResult,
};
use async_trait::async_trait;

/// A database connection owned by a single invocation
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mssql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<StatementResult>;

    /// Execute a statement and collect every result set it produces
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<QueryResult>>;

    /// Invoke a stored procedure, discarding rows and reporting affected counts
    async fn execute_procedure(
        &self,
        procedure: &str,
        params: &[SqlParam],
    ) -> Result<StatementResult>;

    /// Invoke a stored procedure and collect every result set it produces
    async fn query_procedure(
        &self,
        procedure: &str,
        params: &[SqlParam],
    ) -> Result<Vec<QueryResult>>;

    /// Stream a resolved table transfer to the server.
    ///
    /// `progress` is called with the running row count whenever
    /// [`BulkLoadPlan::should_notify`] says so. Returns the number of rows copied.
    async fn bulk_load(
        &self,
        plan: &BulkLoadPlan,
        progress: &mut (dyn FnMut(u64) + Send),
    ) -> Result<u64> {
        let _ = (plan, progress);
        Err(SqlTaskError::Driver(format!(
            "bulk load is not supported by the {} driver",
            self.driver_name()
        )))
    }

    /// Begin a transaction at the given isolation level
    async fn begin_transaction(&self, isolation: NativeIsolation) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction.
///
/// Statements run through the owning `Connection` while the transaction is
/// open; the transaction itself only ends the unit of work.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Isolation level the transaction was started with
    fn isolation(&self) -> NativeIsolation;

    /// Commit the transaction
    async fn commit(&self) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(&self) -> Result<()>;
}
