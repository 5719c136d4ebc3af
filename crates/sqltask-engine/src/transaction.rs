//! Transaction lifecycle for one invocation

use sqltask_core::{Connection, IsolationLevel, Result, SqlTaskError, Transaction};

use crate::guard::OperationGuard;

/// Where the invocation's transaction stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// No transaction has been opened, or isolation `None` skipped it
    None,
    Active,
    Committed,
    RolledBack,
    RollbackFailed,
}

/// How a failure left the transaction
#[derive(Debug)]
pub enum Resolution {
    /// No transaction was active, so nothing was rolled back
    NoTransaction,
    RolledBack,
    /// The rollback raised this error
    RollbackFailed(SqlTaskError),
}

/// Owns the optional transaction of a single invocation.
///
/// Moves through `None -> Active -> Committed | RolledBack | RollbackFailed`.
/// With isolation `None` it never leaves `None`.
pub struct TransactionController {
    isolation: IsolationLevel,
    state: TransactionState,
    transaction: Option<Box<dyn Transaction>>,
}

impl TransactionController {
    pub fn new(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            state: TransactionState::None,
            transaction: None,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Open the transaction, unless isolation is `None`
    pub async fn begin(&mut self, connection: &dyn Connection, guard: &OperationGuard) -> Result<()> {
        if !self.isolation.requires_transaction() {
            tracing::debug!("isolation level None, running without a transaction");
            return Ok(());
        }
        if self.state != TransactionState::None {
            return Err(self.invalid("begin"));
        }

        let native = self.isolation.to_native();
        let transaction = guard
            .run("begin transaction", connection.begin_transaction(native))
            .await?;
        tracing::debug!(isolation = %self.isolation, ?native, "transaction active");
        self.transaction = Some(transaction);
        self.state = TransactionState::Active;
        Ok(())
    }

    /// Commit the active transaction.
    ///
    /// A failed commit leaves the controller `Active` so the failure path
    /// still makes its rollback attempt.
    pub async fn commit(&mut self, guard: &OperationGuard) -> Result<()> {
        if !self.isolation.requires_transaction() {
            return Ok(());
        }
        if self.state != TransactionState::Active {
            return Err(self.invalid("commit"));
        }
        let transaction = self
            .transaction
            .as_deref()
            .ok_or_else(|| SqlTaskError::Transaction("no transaction to commit".to_string()))?;

        guard.run("commit", transaction.commit()).await?;
        self.state = TransactionState::Committed;
        self.transaction = None;
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Make the single rollback attempt for the active transaction
    pub async fn rollback(&mut self, guard: &OperationGuard) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(self.invalid("roll back"));
        }
        let Some(transaction) = self.transaction.take() else {
            self.state = TransactionState::RollbackFailed;
            return Err(SqlTaskError::Transaction(
                "no transaction to roll back".to_string(),
            ));
        };

        tracing::warn!("rolling back transaction");
        match guard.run_cleanup("rollback", transaction.rollback()).await {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "rollback failed");
                self.state = TransactionState::RollbackFailed;
                Err(e)
            }
        }
    }

    /// Settle the transaction after a failure
    pub async fn resolve_failure(&mut self, guard: &OperationGuard) -> Resolution {
        if self.state != TransactionState::Active {
            return Resolution::NoTransaction;
        }
        match self.rollback(guard).await {
            Ok(()) => Resolution::RolledBack,
            Err(e) => Resolution::RollbackFailed(e),
        }
    }

    fn invalid(&self, action: &str) -> SqlTaskError {
        SqlTaskError::InvalidState(format!(
            "cannot {} a transaction in state {:?}",
            action, self.state
        ))
    }
}

impl std::fmt::Debug for TransactionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionController")
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .finish()
    }
}
