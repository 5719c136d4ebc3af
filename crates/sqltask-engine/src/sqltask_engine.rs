//! sqltask engine - transactional batch, bulk load and stored procedure execution
//!
//! One [`ExecutionRequest`] names a connection target and a single operation.
//! [`TaskRunner::run`] binds the caller's data, opens a connection, optionally
//! begins a transaction at the requested isolation level, runs the operation
//! and commits. Any failure goes through one decision procedure that rolls the
//! transaction back at most once and then either returns a failed
//! [`ExecutionResult`] or raises a [`TaskError`], as the request asks.
//!
//! ```no_run
//! use sqltask_engine::{CancellationToken, EngineSettings, ExecutionRequest, TaskRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = ExecutionRequest::from_json(r#"{
//!     "connectionTarget": "Server=tcp:localhost,1433;User Id=sa;Password=secret",
//!     "operation": "batch",
//!     "statement": "UPDATE dbo.Orders SET Status = @status WHERE Id = @id",
//!     "rows": [{"id": 1, "status": "shipped"}],
//!     "options": {"isolationLevel": "ReadCommitted"}
//! }"#)?;
//! let runner = TaskRunner::mssql(EngineSettings::default());
//! let result = runner.run(&request, CancellationToken::new()).await?;
//! println!("{} rows affected", result.affected());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
mod error;
pub mod executor;
mod guard;
pub mod logging;
mod options;
pub mod parameters;
mod request;
mod rows;
mod runner;
mod settings;
pub mod transaction;

pub use classifier::{Failure, Outcome, classify, failure_message};
pub use error::{ExecutorFailure, FailureKind, TaskError};
pub use executor::{ExecutionOutput, Executor};
pub use guard::OperationGuard;
pub use options::{
    BatchOptions, BulkLoadOptions, ColumnMappingStrategy, CommonOptions, ProcedureOptions,
    ProcedureParameter, ProcedureResultMode, ResolvedOptions,
};
pub use request::{ExecutionRequest, ExecutionResult, Operation, OperationKind, ResultData};
pub use rows::{RowSource, parse_rows, rows_from_json};
pub use runner::TaskRunner;
pub use settings::EngineSettings;
pub use transaction::{Resolution, TransactionController, TransactionState};

pub use tokio_util::sync::CancellationToken;
