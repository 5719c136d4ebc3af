//! Bulk load executor
//!
//! Turns caller table data into a [`BulkLoadPlan`] and hands it to the
//! driver. Progress notifications are logged and remembered so a failure can
//! report roughly where in the input it happened.

use indexmap::IndexSet;
use sqltask_core::{
    BulkLoadPlan, ColumnMapping, ColumnMappings, Connection, Result, RowMap, SqlTaskError, Value,
};

use super::ExecutionOutput;
use crate::error::ExecutorFailure;
use crate::guard::OperationGuard;
use crate::options::{BulkLoadOptions, ColumnMappingStrategy};
use crate::rows::RowSource;

#[derive(Debug, Clone)]
pub struct BulkLoadExecutor {
    plan: BulkLoadPlan,
}

impl BulkLoadExecutor {
    pub fn prepare(table: &str, table_data: &RowSource, options: &BulkLoadOptions) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(SqlTaskError::Binding(
                "a destination table is required".to_string(),
            ));
        }
        let rows = table_data.parse()?;
        Ok(Self {
            plan: build_plan(table, rows, options)?,
        })
    }

    pub fn plan(&self) -> &BulkLoadPlan {
        &self.plan
    }

    pub async fn execute(
        &self,
        connection: &dyn Connection,
        guard: &OperationGuard,
    ) -> std::result::Result<ExecutionOutput, ExecutorFailure> {
        let plan = &self.plan;
        let total = plan.row_count();
        let mut last_notified = 0u64;
        let mut progress = |copied: u64| {
            last_notified = copied;
            tracing::info!(table = %plan.table, copied, total, "bulk load progress");
        };

        let result = guard
            .run("bulk load", connection.bulk_load(plan, &mut progress))
            .await;

        match result {
            Ok(copied) => {
                tracing::debug!(table = %plan.table, rows_copied = copied, "bulk load completed");
                Ok(ExecutionOutput::affected(copied))
            }
            Err(e) => {
                tracing::error!(table = %plan.table, last_notified, error = %e, "bulk load failed");
                Err(ExecutorFailure::new(e)
                    .with_affected(last_notified)
                    .with_note(failure_range(last_notified, plan.notify_after)))
            }
        }
    }
}

/// Where a failed transfer stopped, as far as progress notifications tell
pub(crate) fn failure_range(last_notified: u64, notify_after: u64) -> String {
    if notify_after == 0 {
        return "The failing row position is unknown because progress notification was disabled."
            .to_string();
    }
    format!(
        "The failure occurred at approximately rows {} to {}; this range is an approximation \
         based on the last progress notification.",
        last_notified,
        last_notified + notify_after - 1
    )
}

fn build_plan(table: &str, mut rows: Vec<RowMap>, options: &BulkLoadOptions) -> Result<BulkLoadPlan> {
    if options.convert_empty_to_null {
        for row in &mut rows {
            for value in row.values_mut() {
                if value.is_empty_string() {
                    *value = Value::Null;
                }
            }
        }
    }

    let source_columns: IndexSet<String> = rows
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect();

    let mappings = match &options.column_mapping {
        ColumnMappingStrategy::Positional => ColumnMappings::Positional,
        ColumnMappingStrategy::ByName => ColumnMappings::Explicit(
            source_columns
                .iter()
                .map(|name| ColumnMapping::new(name.as_str(), name.as_str()))
                .collect(),
        ),
        ColumnMappingStrategy::Manual { mappings } => {
            if !rows.is_empty() {
                if let Some(missing) = mappings
                    .iter()
                    .find(|m| !source_columns.contains(&m.source))
                {
                    return Err(SqlTaskError::Binding(format!(
                        "mapped source column '{}' is not present in the table data",
                        missing.source
                    )));
                }
            }
            ColumnMappings::Explicit(mappings.clone())
        }
    };

    let values = rows
        .into_iter()
        .map(|mut row| {
            source_columns
                .iter()
                .map(|name| row.swap_remove(name).unwrap_or(Value::Null))
                .collect()
        })
        .collect::<Vec<Vec<Value>>>();

    let notify_after = options.notify_interval(values.len());
    Ok(BulkLoadPlan {
        table: table.trim().to_string(),
        source_columns: source_columns.into_iter().collect(),
        rows: values,
        mappings,
        flags: options.flags(),
        notify_after,
    })
}
