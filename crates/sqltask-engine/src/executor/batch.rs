//! Batch statement executor
//!
//! Runs one parameterized statement once per input row and sums the affected
//! counts.

use std::time::Instant;

use sqltask_core::{Connection, Result, RowMap, SqlParam};

use super::ExecutionOutput;
use crate::error::ExecutorFailure;
use crate::guard::OperationGuard;
use crate::parameters::PreparedStatement;
use crate::rows::RowSource;

#[derive(Debug, Clone)]
pub struct BatchExecutor {
    statement: PreparedStatement,
    /// Bound parameters, one entry per execution
    runs: Vec<Vec<SqlParam>>,
}

impl BatchExecutor {
    /// Bind every row. Without rows the statement runs once, unparameterized.
    pub fn prepare(statement: &str, rows: Option<&RowSource>) -> Result<Self> {
        let statement = PreparedStatement::parse(statement)?;
        let runs = match rows {
            Some(source) => statement.bind_all(&source.parse()?)?,
            None => vec![statement.bind(&RowMap::new(), 0)?],
        };
        Ok(Self { statement, runs })
    }

    /// Statement text sent to the server
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub async fn execute(
        &self,
        connection: &dyn Connection,
        guard: &OperationGuard,
    ) -> std::result::Result<ExecutionOutput, ExecutorFailure> {
        let start = Instant::now();
        let mut affected = 0u64;

        for (index, params) in self.runs.iter().enumerate() {
            match guard
                .run("execute", connection.execute(&self.statement.sql, params))
                .await
            {
                Ok(result) => affected += result.affected_rows,
                Err(e) => {
                    tracing::error!(row = index, affected, error = %e, "batch statement failed");
                    return Err(ExecutorFailure::new(e)
                        .with_affected(affected)
                        .with_note(format!("The failure occurred at input row {}.", index)));
                }
            }
        }

        tracing::debug!(
            runs = self.runs.len(),
            affected_rows = affected,
            duration_ms = start.elapsed().as_millis() as u64,
            "batch completed"
        );
        Ok(ExecutionOutput::affected(affected))
    }
}
