//! Explicit transactions over a shared tiberius client

use async_trait::async_trait;
use sqltask_core::{NativeIsolation, Result, SqlTaskError, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::connection::{MssqlClient, MssqlConnectionError, SharedClient, catch_driver_panic};
use crate::dialect::MssqlDialect;

/// A transaction opened with `BEGIN TRANSACTION` on an `MssqlConnection`.
///
/// Transaction control runs as plain SQL batches rather than through
/// `sp_executesql`, so the transaction count seen by the session matches the
/// one the server expects when the batch ends. Statements executed on the
/// owning connection while the transaction is open take part in it.
pub struct MssqlTransaction {
    client: SharedClient,
    isolation: NativeIsolation,
    finished: AtomicBool,
    dialect: MssqlDialect,
}

impl MssqlTransaction {
    #[tracing::instrument(skip(client))]
    pub(crate) async fn begin(client: SharedClient, isolation: NativeIsolation) -> Result<Self> {
        let dialect = MssqlDialect::new();
        let sql = dialect.begin_transaction(isolation);
        run_batch(&client, &sql).await?;
        tracing::debug!("transaction started");
        Ok(Self {
            client,
            isolation,
            finished: AtomicBool::new(false),
            dialect,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(SqlTaskError::Transaction(
                "transaction has already been committed or rolled back".to_string(),
            ));
        }
        Ok(())
    }
}

async fn run_batch(client: &SharedClient, sql: &str) -> Result<()> {
    let mut guard = client.lock().await;
    let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;
    match catch_driver_panic("transaction control", simple_batch(client, sql)).await {
        Ok(outcome) => Ok(outcome?),
        Err(panicked) => {
            guard.take();
            Err(panicked.into())
        }
    }
}

async fn simple_batch(
    client: &mut MssqlClient,
    sql: &str,
) -> std::result::Result<(), MssqlConnectionError> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

#[async_trait]
impl Transaction for MssqlTransaction {
    fn isolation(&self) -> NativeIsolation {
        self.isolation
    }

    async fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        run_batch(&self.client, self.dialect.commit_transaction()).await?;
        self.finished.store(true, Ordering::SeqCst);
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        // A failed rollback still ends this handle; the server decides what remains open.
        self.finished.store(true, Ordering::SeqCst);
        run_batch(&self.client, self.dialect.rollback_transaction()).await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for MssqlTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlTransaction")
            .field("isolation", &self.isolation)
            .field("finished", &self.finished.load(Ordering::SeqCst))
            .finish()
    }
}
