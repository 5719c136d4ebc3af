//! Transaction controller state transitions

mod common;

use std::sync::Arc;

use common::{FakeBehavior, FakeConnection, FakeServer};
use sqltask_core::{IsolationLevel, SqlTaskError};
use sqltask_engine::{
    CancellationToken, OperationGuard, Resolution, TransactionController, TransactionState,
};

fn connection(behavior: FakeBehavior) -> (FakeConnection, Arc<FakeServer>) {
    let server = Arc::new(FakeServer::default());
    (FakeConnection::new(server.clone(), behavior), server)
}

fn guard() -> OperationGuard {
    OperationGuard::new(None, CancellationToken::new())
}

#[tokio::test]
async fn test_begin_then_commit() {
    let (conn, server) = connection(FakeBehavior::default());
    let guard = guard();
    let mut tx = TransactionController::new(IsolationLevel::Serializable);

    tx.begin(&conn, &guard).await.unwrap();
    assert_eq!(tx.state(), TransactionState::Active);
    tx.commit(&guard).await.unwrap();

    assert_eq!(tx.state(), TransactionState::Committed);
    assert_eq!(server.log(), vec!["BEGIN Serializable", "COMMIT"]);
}

#[tokio::test]
async fn test_isolation_none_stays_without_transaction() {
    let (conn, server) = connection(FakeBehavior::default());
    let guard = guard();
    let mut tx = TransactionController::new(IsolationLevel::None);

    tx.begin(&conn, &guard).await.unwrap();
    tx.commit(&guard).await.unwrap();

    assert_eq!(tx.state(), TransactionState::None);
    assert!(matches!(
        tx.resolve_failure(&guard).await,
        Resolution::NoTransaction
    ));
    assert!(server.log().is_empty());
}

#[tokio::test]
async fn test_failed_commit_stays_active() {
    let (conn, server) = connection(FakeBehavior {
        fail_commit: true,
        ..Default::default()
    });
    let guard = guard();
    let mut tx = TransactionController::new(IsolationLevel::ReadCommitted);

    tx.begin(&conn, &guard).await.unwrap();
    assert!(tx.commit(&guard).await.is_err());
    assert_eq!(tx.state(), TransactionState::Active);

    assert!(matches!(
        tx.resolve_failure(&guard).await,
        Resolution::RolledBack
    ));
    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert_eq!(server.rollbacks(), 1);
}

#[tokio::test]
async fn test_rollback_failure_is_reported_once() {
    let (conn, server) = connection(FakeBehavior {
        fail_rollback: true,
        ..Default::default()
    });
    let guard = guard();
    let mut tx = TransactionController::new(IsolationLevel::Default);

    tx.begin(&conn, &guard).await.unwrap();
    let resolution = tx.resolve_failure(&guard).await;

    assert!(matches!(
        resolution,
        Resolution::RollbackFailed(SqlTaskError::Query(_))
    ));
    assert_eq!(tx.state(), TransactionState::RollbackFailed);
    // a second resolution must not roll back again
    assert!(matches!(
        tx.resolve_failure(&guard).await,
        Resolution::NoTransaction
    ));
    let rollbacks = server.log().iter().filter(|e| *e == "ROLLBACK").count();
    assert_eq!(rollbacks, 1);
}

#[tokio::test]
async fn test_invalid_transitions() {
    let (conn, _server) = connection(FakeBehavior::default());
    let guard = guard();
    let mut tx = TransactionController::new(IsolationLevel::ReadCommitted);

    let err = tx.commit(&guard).await.unwrap_err();
    assert!(matches!(err, SqlTaskError::InvalidState(_)));
    let err = tx.rollback(&guard).await.unwrap_err();
    assert!(matches!(err, SqlTaskError::InvalidState(_)));

    tx.begin(&conn, &guard).await.unwrap();
    let err = tx.begin(&conn, &guard).await.unwrap_err();
    assert!(matches!(err, SqlTaskError::InvalidState(_)));
}

#[tokio::test]
async fn test_rollback_runs_after_cancellation() {
    let (conn, server) = connection(FakeBehavior::default());
    let token = CancellationToken::new();
    let guard = OperationGuard::new(None, token.clone());
    let mut tx = TransactionController::new(IsolationLevel::ReadCommitted);

    tx.begin(&conn, &guard).await.unwrap();
    token.cancel();

    assert!(matches!(
        tx.resolve_failure(&guard).await,
        Resolution::RolledBack
    ));
    assert_eq!(server.rollbacks(), 1);
}
