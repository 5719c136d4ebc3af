//! Errors raised to callers that asked for failures to be thrown

use sqltask_core::SqlTaskError;
use thiserror::Error;

/// What went wrong before the failure protocol took over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The connection could not be opened or authenticated
    Connection,
    /// Caller data could not be parsed or bound to parameters
    Binding,
    /// The operation or its commit failed on the server
    Execution,
    /// The invocation was cancelled or timed out waiting
    Cancelled,
}

impl FailureKind {
    /// Classify the original error of a failure
    pub fn of(err: &SqlTaskError) -> Self {
        if err.is_cancelled() {
            FailureKind::Cancelled
        } else if err.is_connection() {
            FailureKind::Connection
        } else if err.is_binding() {
            FailureKind::Binding
        } else {
            FailureKind::Execution
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Connection => "connection",
            FailureKind::Binding => "binding",
            FailureKind::Execution => "execution",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// An executor failure together with what had been applied when it happened
#[derive(Debug)]
pub struct ExecutorFailure {
    pub error: SqlTaskError,
    /// Rows affected before the failure
    pub affected: u64,
    /// Extra detail appended to the failure message, such as a row range
    pub note: Option<String>,
}

impl ExecutorFailure {
    pub fn new(error: SqlTaskError) -> Self {
        Self {
            error,
            affected: 0,
            note: None,
        }
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl From<SqlTaskError> for ExecutorFailure {
    fn from(error: SqlTaskError) -> Self {
        Self::new(error)
    }
}

/// The error an invocation raises when `throwOnFailure` is set.
///
/// The display text is the same text a returned failure result carries as
/// its `errorMessage`. The original failure is the error source.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The failure happened with no transaction open
    #[error("{message}")]
    NoTransaction {
        message: String,
        kind: FailureKind,
        affected: u64,
        #[source]
        cause: SqlTaskError,
    },

    /// The failure happened inside a transaction that was rolled back
    #[error("{message}")]
    RolledBack {
        message: String,
        kind: FailureKind,
        affected: u64,
        #[source]
        cause: SqlTaskError,
    },

    /// The rollback attempted after the failure raised its own error
    #[error("{message}")]
    RollbackFailed {
        message: String,
        kind: FailureKind,
        affected: u64,
        #[source]
        cause: SqlTaskError,
        rollback_error: SqlTaskError,
    },
}

impl TaskError {
    pub fn message(&self) -> &str {
        match self {
            TaskError::NoTransaction { message, .. }
            | TaskError::RolledBack { message, .. }
            | TaskError::RollbackFailed { message, .. } => message,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TaskError::NoTransaction { kind, .. }
            | TaskError::RolledBack { kind, .. }
            | TaskError::RollbackFailed { kind, .. } => *kind,
        }
    }

    /// Rows affected when the failure happened
    pub fn affected(&self) -> u64 {
        match self {
            TaskError::NoTransaction { affected, .. }
            | TaskError::RolledBack { affected, .. }
            | TaskError::RollbackFailed { affected, .. } => *affected,
        }
    }

    /// The original failure
    pub fn cause(&self) -> &SqlTaskError {
        match self {
            TaskError::NoTransaction { cause, .. }
            | TaskError::RolledBack { cause, .. }
            | TaskError::RollbackFailed { cause, .. } => cause,
        }
    }

    /// The error the rollback raised, if it failed
    pub fn rollback_error(&self) -> Option<&SqlTaskError> {
        match self {
            TaskError::RollbackFailed { rollback_error, .. } => Some(rollback_error),
            _ => None,
        }
    }
}
