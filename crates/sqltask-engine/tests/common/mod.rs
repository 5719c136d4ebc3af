//! Common test utilities and fakes
//!
//! The fakes model just enough of a server to observe the engine: every call
//! is logged, rows applied inside a transaction stay pending until commit,
//! and failures can be injected at a chosen call.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sqltask_core::{
    BulkLoadPlan, Connection, ConnectionConfig, ConnectionFactory, NativeIsolation, QueryResult,
    Result, SqlParam, SqlTaskError, StatementResult, Transaction,
};
use std::sync::Arc;
use std::time::Duration;

/// Server-side state shared by every connection a factory hands out
#[derive(Default)]
pub struct FakeServer {
    /// Every call, in order: statements, BEGIN/COMMIT/ROLLBACK, CLOSE
    pub log: Mutex<Vec<String>>,
    /// Parameters of every execute call
    pub params: Mutex<Vec<Vec<SqlParam>>>,
    /// Rows made durable
    pub committed_rows: Mutex<u64>,
    /// Rows applied inside the open transaction
    pub pending_rows: Mutex<u64>,
    pub in_transaction: Mutex<bool>,
    pub execute_calls: Mutex<usize>,
    pub connects: Mutex<usize>,
    pub closes: Mutex<usize>,
    pub flushes: Mutex<usize>,
    /// Rollbacks that actually ran
    pub rollbacks: Mutex<usize>,
}

impl FakeServer {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn committed_rows(&self) -> u64 {
        *self.committed_rows.lock()
    }

    pub fn rollbacks(&self) -> usize {
        *self.rollbacks.lock()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock()
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().push(entry.into());
    }

    fn apply(&self, rows: u64) {
        if *self.in_transaction.lock() {
            *self.pending_rows.lock() += rows;
        } else {
            *self.committed_rows.lock() += rows;
        }
    }
}

/// Knobs for the behavior of a fake connection
#[derive(Clone)]
pub struct FakeBehavior {
    /// Rows each execute call reports
    pub affected_per_execute: u64,
    /// Fail the execute call with this 0-based index
    pub fail_execute_at: Option<usize>,
    pub execute_delay: Option<Duration>,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_close: bool,
    /// Result sets returned by procedure queries
    pub query_results: Vec<QueryResult>,
    pub procedure_affected: u64,
    /// Fail a bulk load after this many rows
    pub bulk_fail_after: Option<u64>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            affected_per_execute: 1,
            fail_execute_at: None,
            execute_delay: None,
            fail_begin: false,
            fail_commit: false,
            fail_rollback: false,
            fail_close: false,
            query_results: Vec::new(),
            procedure_affected: 0,
            bulk_fail_after: None,
        }
    }
}

pub struct FakeConnection {
    server: Arc<FakeServer>,
    behavior: FakeBehavior,
}

impl FakeConnection {
    pub fn new(server: Arc<FakeServer>, behavior: FakeBehavior) -> Self {
        Self { server, behavior }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn driver_name(&self) -> &str {
        "fake"
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<StatementResult> {
        let call = {
            let mut calls = self.server.execute_calls.lock();
            *calls += 1;
            *calls - 1
        };
        self.server.record(sql);
        self.server.params.lock().push(params.to_vec());

        if let Some(delay) = self.behavior.execute_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_execute_at == Some(call) {
            return Err(SqlTaskError::Query(
                "Violation of PRIMARY KEY constraint 'PK_Items' (error 2627)".into(),
            ));
        }

        let affected_rows = self.behavior.affected_per_execute;
        self.server.apply(affected_rows);
        Ok(StatementResult { affected_rows })
    }

    async fn query(&self, sql: &str, _params: &[SqlParam]) -> Result<Vec<QueryResult>> {
        self.server.record(sql);
        Ok(self.behavior.query_results.clone())
    }

    async fn execute_procedure(
        &self,
        procedure: &str,
        params: &[SqlParam],
    ) -> Result<StatementResult> {
        self.server.record(format!("EXEC {}", procedure));
        self.server.params.lock().push(params.to_vec());
        Ok(StatementResult {
            affected_rows: self.behavior.procedure_affected,
        })
    }

    async fn query_procedure(
        &self,
        procedure: &str,
        params: &[SqlParam],
    ) -> Result<Vec<QueryResult>> {
        self.server.record(format!("EXEC {}", procedure));
        self.server.params.lock().push(params.to_vec());
        Ok(self.behavior.query_results.clone())
    }

    async fn bulk_load(
        &self,
        plan: &BulkLoadPlan,
        progress: &mut (dyn FnMut(u64) + Send),
    ) -> Result<u64> {
        self.server.record(format!("BULK {}", plan.table));
        let mut copied = 0u64;
        for _ in &plan.rows {
            if self.behavior.bulk_fail_after == Some(copied) {
                self.server.apply(copied);
                return Err(SqlTaskError::Query(format!(
                    "bulk load aborted after {} rows",
                    copied
                )));
            }
            copied += 1;
            if plan.should_notify(copied) {
                progress(copied);
            }
        }
        self.server.apply(copied);
        Ok(copied)
    }

    async fn begin_transaction(&self, isolation: NativeIsolation) -> Result<Box<dyn Transaction>> {
        self.server.record(format!("BEGIN {:?}", isolation));
        if self.behavior.fail_begin {
            return Err(SqlTaskError::Transaction("cannot begin".into()));
        }
        *self.server.in_transaction.lock() = true;
        Ok(Box::new(FakeTransaction {
            server: Arc::clone(&self.server),
            isolation,
            fail_commit: self.behavior.fail_commit,
            fail_rollback: self.behavior.fail_rollback,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.server.record("CLOSE");
        *self.server.closes.lock() += 1;
        if self.behavior.fail_close {
            return Err(SqlTaskError::Connection("socket already closed".into()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

pub struct FakeTransaction {
    server: Arc<FakeServer>,
    isolation: NativeIsolation,
    fail_commit: bool,
    fail_rollback: bool,
}

#[async_trait]
impl Transaction for FakeTransaction {
    fn isolation(&self) -> NativeIsolation {
        self.isolation
    }

    async fn commit(&self) -> Result<()> {
        self.server.record("COMMIT");
        if self.fail_commit {
            return Err(SqlTaskError::Query(
                "The transaction log for database 'app' is full (error 9002)".into(),
            ));
        }
        let pending = std::mem::take(&mut *self.server.pending_rows.lock());
        *self.server.committed_rows.lock() += pending;
        *self.server.in_transaction.lock() = false;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.server.record("ROLLBACK");
        if self.fail_rollback {
            return Err(SqlTaskError::Query(
                "The ROLLBACK TRANSACTION request has no corresponding BEGIN TRANSACTION (error 3903)"
                    .into(),
            ));
        }
        *self.server.pending_rows.lock() = 0;
        *self.server.in_transaction.lock() = false;
        *self.server.rollbacks.lock() += 1;
        Ok(())
    }
}

/// Factory handing out fake connections that share one `FakeServer`
pub struct FakeFactory {
    pub server: Arc<FakeServer>,
    pub behavior: FakeBehavior,
    /// Fail every connect with this error
    pub connect_error: Option<fn() -> SqlTaskError>,
    pub connect_delay: Option<Duration>,
}

impl FakeFactory {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            server: Arc::new(FakeServer::default()),
            behavior,
            connect_error: None,
            connect_delay: None,
        }
    }

    pub fn failing_login() -> Self {
        Self {
            connect_error: Some(|| {
                SqlTaskError::Authentication("Login failed for user 'sa'.".into())
            }),
            ..Self::new(FakeBehavior::default())
        }
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        *self.server.connects.lock() += 1;
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.connect_error {
            return Err(error());
        }
        Ok(Box::new(FakeConnection::new(
            Arc::clone(&self.server),
            self.behavior.clone(),
        )))
    }

    async fn flush_pool(&self) {
        *self.server.flushes.lock() += 1;
    }
}

/// Install a test subscriber once, honoring `RUST_LOG`
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
