//! Operation executors
//!
//! Each request runs exactly one executor. Preparing an executor parses and
//! binds all caller data, so malformed input fails before a connection is
//! opened. Executing it runs the operation on an open connection and reports
//! either the output or the failure together with what had been applied.

mod batch;
mod bulk;
mod procedure;

pub use batch::BatchExecutor;
pub use bulk::BulkLoadExecutor;
pub use procedure::ProcedureExecutor;

use sqltask_core::{Connection, Result, SpatialFormatter};

use crate::error::ExecutorFailure;
use crate::guard::OperationGuard;
use crate::request::{Operation, OperationKind, ResultData};
use crate::settings::EngineSettings;

/// What a successful execution produced
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub affected: u64,
    pub data: Option<ResultData>,
}

impl ExecutionOutput {
    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            data: None,
        }
    }
}

/// A prepared operation
#[derive(Debug)]
pub enum Executor {
    Batch(BatchExecutor),
    BulkLoad(BulkLoadExecutor),
    Procedure(ProcedureExecutor),
}

impl Executor {
    /// Parse and bind the operation's input
    pub fn prepare(operation: &Operation, settings: &EngineSettings) -> Result<Self> {
        let executor = match operation {
            Operation::Batch {
                statement, rows, ..
            } => Executor::Batch(BatchExecutor::prepare(statement, rows.as_ref())?),
            Operation::BulkLoad {
                table,
                table_data,
                options,
            } => Executor::BulkLoad(BulkLoadExecutor::prepare(table, table_data, options)?),
            Operation::Procedure {
                procedure,
                parameters,
                options,
            } => Executor::Procedure(ProcedureExecutor::prepare(
                procedure,
                parameters,
                options
                    .result_mode
                    .unwrap_or(settings.procedure_result_mode),
            )?),
        };
        Ok(executor)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Executor::Batch(_) => OperationKind::Batch,
            Executor::BulkLoad(_) => OperationKind::BulkLoad,
            Executor::Procedure(_) => OperationKind::Procedure,
        }
    }

    /// Run the operation on an open connection
    pub async fn execute(
        &self,
        connection: &dyn Connection,
        guard: &OperationGuard,
        spatial: &dyn SpatialFormatter,
    ) -> std::result::Result<ExecutionOutput, ExecutorFailure> {
        match self {
            Executor::Batch(executor) => executor.execute(connection, guard).await,
            Executor::BulkLoad(executor) => executor.execute(connection, guard).await,
            Executor::Procedure(executor) => executor.execute(connection, guard, spatial).await,
        }
    }
}
