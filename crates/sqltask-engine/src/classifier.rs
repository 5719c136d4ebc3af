//! Failure classification and result reporting
//!
//! Every failure of an invocation ends here exactly once. The outcome depends
//! only on the failure, how the transaction was settled and whether the caller
//! wants failures raised:
//!
//! | Transaction   | Rollback | Message theme                                      |
//! |---------------|----------|----------------------------------------------------|
//! | none          | none     | no transaction was active; no rollback possible    |
//! | active        | succeeds | rollback completed without exception               |
//! | active        | raises   | an exception occurred during rollback              |

use sqltask_core::SqlTaskError;

use crate::error::{FailureKind, TaskError};
use crate::request::{ExecutionResult, OperationKind};
use crate::transaction::Resolution;

const NO_TRANSACTION: &str = "no transaction was active; no rollback possible";
const ROLLED_BACK: &str = "rollback completed without exception";
const ROLLBACK_FAILED: &str = "an exception occurred during rollback";

/// A failure waiting to be reported
#[derive(Debug)]
pub struct Failure {
    pub operation: OperationKind,
    pub kind: FailureKind,
    pub error: SqlTaskError,
    /// Rows affected when the failure happened
    pub affected: u64,
    pub note: Option<String>,
}

impl Failure {
    pub fn new(operation: OperationKind, error: SqlTaskError) -> Self {
        Self {
            operation,
            kind: FailureKind::of(&error),
            error,
            affected: 0,
            note: None,
        }
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// How a failure surfaces to the caller
#[derive(Debug)]
pub enum Outcome {
    Raise(TaskError),
    Report(ExecutionResult),
}

/// Compose the failure message
pub fn failure_message(failure: &Failure, resolution: &Resolution) -> String {
    let theme = match resolution {
        Resolution::NoTransaction => NO_TRANSACTION,
        Resolution::RolledBack => ROLLED_BACK,
        Resolution::RollbackFailed(_) => ROLLBACK_FAILED,
    };
    let mut message = format!(
        "{} failed: {}. {}",
        failure.operation.label(),
        theme,
        failure.error
    );
    if let Some(note) = &failure.note {
        message.push(' ');
        message.push_str(note);
    }
    if let Resolution::RollbackFailed(rollback_error) = resolution {
        message.push_str(&format!(" Rollback error: {}", rollback_error));
    }
    message
}

/// Decide how a failure surfaces
pub fn classify(failure: Failure, resolution: Resolution, throw_on_failure: bool) -> Outcome {
    let message = failure_message(&failure, &resolution);

    if !throw_on_failure {
        return Outcome::Report(ExecutionResult::failed(failure.affected, message));
    }

    let Failure {
        kind,
        error: cause,
        affected,
        ..
    } = failure;
    let error = match resolution {
        Resolution::NoTransaction => TaskError::NoTransaction {
            message,
            kind,
            affected,
            cause,
        },
        Resolution::RolledBack => TaskError::RolledBack {
            message,
            kind,
            affected,
            cause,
        },
        Resolution::RollbackFailed(rollback_error) => TaskError::RollbackFailed {
            message,
            kind,
            affected,
            cause,
            rollback_error,
        },
    };
    Outcome::Raise(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::error::Error as _;

    fn query_failure() -> Failure {
        Failure::new(
            OperationKind::Batch,
            SqlTaskError::Query("Violation of PRIMARY KEY constraint (error 2627)".into()),
        )
        .with_affected(2)
    }

    fn raised(outcome: Outcome) -> TaskError {
        match outcome {
            Outcome::Raise(err) => err,
            Outcome::Report(result) => panic!("expected a raised error, got {:?}", result),
        }
    }

    fn reported(outcome: Outcome) -> ExecutionResult {
        match outcome {
            Outcome::Report(result) => result,
            Outcome::Raise(err) => panic!("expected a result, got {:?}", err),
        }
    }

    #[rstest]
    #[case(Resolution::NoTransaction, NO_TRANSACTION)]
    #[case(Resolution::RolledBack, ROLLED_BACK)]
    #[case(
        Resolution::RollbackFailed(SqlTaskError::Transaction("gone".into())),
        ROLLBACK_FAILED
    )]
    fn test_reported_failure_carries_theme(#[case] resolution: Resolution, #[case] theme: &str) {
        let result = reported(classify(query_failure(), resolution, false));
        assert!(!result.success());
        assert_eq!(result.affected(), 2);
        let message = result.error_message().unwrap();
        assert!(message.starts_with("Batch execution failed: "));
        assert!(message.contains(theme));
    }

    #[test]
    fn test_message_format() {
        let message = failure_message(&query_failure(), &Resolution::RolledBack);
        assert_eq!(
            message,
            "Batch execution failed: rollback completed without exception. \
             Query error: Violation of PRIMARY KEY constraint (error 2627)"
        );
    }

    #[test]
    fn test_message_appends_note_then_rollback_error() {
        let failure = Failure::new(OperationKind::BulkLoad, SqlTaskError::Query("timeout".into()))
            .with_note(Some("Near row 10.".into()));
        let message = failure_message(
            &failure,
            &Resolution::RollbackFailed(SqlTaskError::Connection("reset".into())),
        );
        assert_eq!(
            message,
            "Bulk load failed: an exception occurred during rollback. Query error: timeout \
             Near row 10. Rollback error: Connection error: reset"
        );
    }

    #[test]
    fn test_raised_and_reported_text_agree() {
        let reported = reported(classify(query_failure(), Resolution::RolledBack, false));
        let raised = raised(classify(query_failure(), Resolution::RolledBack, true));
        assert_eq!(reported.error_message(), Some(raised.to_string().as_str()));
        assert_eq!(raised.affected(), reported.affected());
    }

    #[test]
    fn test_raised_error_chains_original_cause() {
        let err = raised(classify(query_failure(), Resolution::RolledBack, true));
        assert!(matches!(err, TaskError::RolledBack { .. }));
        assert_eq!(err.kind(), FailureKind::Execution);
        let source = err.source().map(|s| s.to_string()).unwrap();
        assert!(source.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_rollback_failure_keeps_both_causes() {
        let err = raised(classify(
            query_failure(),
            Resolution::RollbackFailed(SqlTaskError::Transaction("no BEGIN".into())),
            true,
        ));
        assert!(matches!(err.cause(), SqlTaskError::Query(_)));
        assert!(err.rollback_error().is_some());
        assert!(err.to_string().ends_with("Rollback error: Transaction error: no BEGIN"));
    }

    #[test]
    fn test_connection_failure_uses_no_transaction_theme() {
        let failure = Failure::new(
            OperationKind::Procedure,
            SqlTaskError::Authentication("Login failed for user 'sa'.".into()),
        );
        let err = raised(classify(failure, Resolution::NoTransaction, true));
        assert!(matches!(err, TaskError::NoTransaction { .. }));
        assert_eq!(err.kind(), FailureKind::Connection);
        assert_eq!(
            err.to_string(),
            "Stored procedure execution failed: no transaction was active; no rollback \
             possible. Authentication failed: Login failed for user 'sa'."
        );
    }
}
