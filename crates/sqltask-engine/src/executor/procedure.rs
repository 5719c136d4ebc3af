//! Stored procedure executor

use sqltask_core::{
    Connection, QueryResult, Result, RowMap, SpatialFormatter, SqlParam, SqlTaskError, Value,
};

use super::ExecutionOutput;
use crate::error::ExecutorFailure;
use crate::guard::OperationGuard;
use crate::options::{ProcedureParameter, ProcedureResultMode};
use crate::parameters::bind_procedure_parameters;
use crate::request::ResultData;

#[derive(Debug, Clone)]
pub struct ProcedureExecutor {
    procedure: String,
    params: Vec<SqlParam>,
    mode: ProcedureResultMode,
}

impl ProcedureExecutor {
    pub fn prepare(
        procedure: &str,
        parameters: &[ProcedureParameter],
        mode: ProcedureResultMode,
    ) -> Result<Self> {
        let procedure = procedure.trim();
        if procedure.is_empty() {
            return Err(SqlTaskError::Binding(
                "a stored procedure name is required".to_string(),
            ));
        }
        Ok(Self {
            procedure: procedure.to_string(),
            params: bind_procedure_parameters(parameters)?,
            mode,
        })
    }

    pub fn mode(&self) -> ProcedureResultMode {
        self.mode
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub async fn execute(
        &self,
        connection: &dyn Connection,
        guard: &OperationGuard,
        spatial: &dyn SpatialFormatter,
    ) -> std::result::Result<ExecutionOutput, ExecutorFailure> {
        tracing::debug!(procedure = %self.procedure, mode = ?self.mode, "executing stored procedure");
        let output = match self.mode {
            ProcedureResultMode::NoResult => {
                let result = guard
                    .run(
                        "execute procedure",
                        connection.execute_procedure(&self.procedure, &self.params),
                    )
                    .await?;
                ExecutionOutput::affected(result.affected_rows)
            }
            ProcedureResultMode::Scalar => {
                let sets = self.query(connection, guard).await?;
                match first_value(sets) {
                    Some(value) => ExecutionOutput {
                        affected: 1,
                        data: Some(ResultData::Scalar(present(value, spatial)?)),
                    },
                    None => ExecutionOutput::affected(0),
                }
            }
            ProcedureResultMode::Reader => {
                let sets = self.query(connection, guard).await?;
                let rows = flatten_rows(sets, spatial)?;
                ExecutionOutput {
                    affected: rows.len() as u64,
                    data: Some(ResultData::Rows(rows)),
                }
            }
        };
        Ok(output)
    }

    async fn query(
        &self,
        connection: &dyn Connection,
        guard: &OperationGuard,
    ) -> Result<Vec<QueryResult>> {
        guard
            .run(
                "query procedure",
                connection.query_procedure(&self.procedure, &self.params),
            )
            .await
    }
}

/// First column of the first row of the first result set
fn first_value(sets: Vec<QueryResult>) -> Option<Value> {
    sets.into_iter()
        .next()?
        .rows
        .into_iter()
        .next()?
        .values
        .into_iter()
        .next()
}

/// Every row of every result set, in order
pub(crate) fn flatten_rows(
    sets: Vec<QueryResult>,
    spatial: &dyn SpatialFormatter,
) -> Result<Vec<RowMap>> {
    let mut rows = Vec::new();
    for set in sets {
        for row in set.rows {
            let row = row
                .into_map()
                .into_iter()
                .map(|(name, value)| Ok((name, present(value, spatial)?)))
                .collect::<Result<RowMap>>()?;
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Replace spatial values with their text form
pub(crate) fn present(value: Value, spatial: &dyn SpatialFormatter) -> Result<Value> {
    match value {
        Value::Spatial(shape) => spatial.format(&shape).map(Value::String),
        other => Ok(other),
    }
}
