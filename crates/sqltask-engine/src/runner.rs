//! Invocation entry point

use std::sync::Arc;

use sqltask_core::{
    Connection, ConnectionFactory, HexSpatialFormatter, IsolationLevel, SpatialFormatter,
};
use sqltask_driver_mssql::MssqlDriver;
use tokio_util::sync::CancellationToken;

use crate::classifier::{Failure, Outcome, classify};
use crate::error::{FailureKind, TaskError};
use crate::executor::{ExecutionOutput, Executor};
use crate::guard::OperationGuard;
use crate::request::{ExecutionRequest, ExecutionResult, OperationKind};
use crate::settings::EngineSettings;
use crate::transaction::{Resolution, TransactionController};

/// Runs requests, one connection per invocation.
///
/// Invocations share nothing but the factory and settings, so one runner can
/// serve concurrent invocations.
pub struct TaskRunner {
    factory: Arc<dyn ConnectionFactory>,
    settings: EngineSettings,
    spatial: Arc<dyn SpatialFormatter>,
}

impl TaskRunner {
    pub fn new(factory: Arc<dyn ConnectionFactory>, settings: EngineSettings) -> Self {
        Self {
            factory,
            settings,
            spatial: Arc::new(HexSpatialFormatter),
        }
    }

    /// A runner backed by the SQL Server driver
    pub fn mssql(settings: EngineSettings) -> Self {
        Self::new(Arc::new(MssqlDriver::new()), settings)
    }

    pub fn with_spatial_formatter(mut self, spatial: Arc<dyn SpatialFormatter>) -> Self {
        self.spatial = spatial;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one request.
    ///
    /// Returns the result, or the raised error when the request asked for
    /// failures to be thrown. The connection is closed and the pool flushed on
    /// every path.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(
            operation = %request.operation.kind(),
            target = %request.connection_target.describe()
        )
    )]
    pub async fn run(
        &self,
        request: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, TaskError> {
        let operation = request.operation.kind();
        let options = request.operation.common_options().resolve(&self.settings);
        let guard = OperationGuard::new(options.timeout, cancel);
        let throw = options.throw_on_failure;

        let executor = match Executor::prepare(&request.operation, &self.settings) {
            Ok(executor) => executor,
            Err(e) => {
                tracing::warn!(error = %e, "request input rejected");
                let failure = Failure::new(operation, e).with_kind(FailureKind::Binding);
                return finish(classify(failure, Resolution::NoTransaction, throw));
            }
        };

        let connection = match guard
            .run("connect", self.factory.connect(&request.connection_target))
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(error = %e, "failed to open connection");
                let failure = Failure::new(operation, e);
                let failure = if failure.kind == FailureKind::Cancelled {
                    failure
                } else {
                    failure.with_kind(FailureKind::Connection)
                };
                self.flush_pool().await;
                return finish(classify(failure, Resolution::NoTransaction, throw));
            }
        };

        let outcome = self
            .execute(
                operation,
                &executor,
                connection.as_ref(),
                options.isolation_level,
                &guard,
                throw,
            )
            .await;

        if let Err(e) = guard.run_cleanup("close", connection.close()).await {
            tracing::warn!(error = %e, "failed to close connection");
        }
        self.flush_pool().await;
        finish(outcome)
    }

    async fn execute(
        &self,
        operation: OperationKind,
        executor: &Executor,
        connection: &dyn Connection,
        isolation: IsolationLevel,
        guard: &OperationGuard,
        throw: bool,
    ) -> Outcome {
        let mut transaction = TransactionController::new(isolation);

        if let Err(e) = transaction.begin(connection, guard).await {
            tracing::error!(error = %e, "failed to begin transaction");
            let resolution = transaction.resolve_failure(guard).await;
            return classify(Failure::new(operation, e), resolution, throw);
        }

        let output = match executor.execute(connection, guard, self.spatial.as_ref()).await {
            Ok(output) => output,
            Err(failure) => {
                let resolution = transaction.resolve_failure(guard).await;
                let failure = Failure::new(operation, failure.error)
                    .with_affected(failure.affected)
                    .with_note(failure.note);
                return classify(failure, resolution, throw);
            }
        };

        if let Err(e) = transaction.commit(guard).await {
            tracing::error!(error = %e, "commit failed");
            let resolution = transaction.resolve_failure(guard).await;
            let failure = Failure::new(operation, e).with_affected(output.affected);
            return classify(failure, resolution, throw);
        }

        let ExecutionOutput { affected, data } = output;
        tracing::info!(affected, "invocation succeeded");
        Outcome::Report(ExecutionResult::succeeded(affected, data))
    }

    async fn flush_pool(&self) {
        if self.settings.flush_pool {
            self.factory.flush_pool().await;
        }
    }
}

fn finish(outcome: Outcome) -> Result<ExecutionResult, TaskError> {
    match outcome {
        Outcome::Report(result) => Ok(result),
        Outcome::Raise(error) => Err(error),
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("driver", &self.factory.id())
            .field("settings", &self.settings)
            .finish()
    }
}
