//! Cancellation and command timeout around each network operation

use std::future::Future;
use std::time::Duration;

use sqltask_core::{Result, SqlTaskError};
use tokio_util::sync::CancellationToken;

/// Bounds every awaited database call of one invocation
#[derive(Debug, Clone)]
pub struct OperationGuard {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl OperationGuard {
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` unless the invocation is cancelled or the timeout elapses first
    pub async fn run<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(operation = what, "cancelled");
                Err(SqlTaskError::Cancelled)
            }
            result = self.bounded(what, fut) => result,
        }
    }

    /// Run a cleanup step such as a rollback.
    ///
    /// Cleanup ignores cancellation but still honors the timeout.
    pub async fn run_cleanup<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.bounded(what, fut).await
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(SqlTaskError::Timeout(format!(
                    "{} did not complete within {} seconds",
                    what,
                    limit.as_secs()
                )))
            }),
            None => fut.await,
        }
    }
}
