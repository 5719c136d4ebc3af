//! Bulk table transfer
//!
//! A transfer whose flags are all off and whose mapping covers every writable
//! destination column is streamed with the TDS bulk load protocol. Any other
//! transfer is applied as one parameterized `INSERT` per row, which is how
//! identity values, table locks and kept nulls are honored.
//!
//! Row inserts always fire triggers, so unless the plan asks for them the
//! table's enabled `INSERT` triggers are disabled for the duration of the
//! transfer. Tables with `geometry`, `geography` or `hierarchyid` columns also
//! take the row path: the bulk load request reads the table's column metadata,
//! which tiberius cannot decode for those types.

use sqltask_core::{BulkLoadPlan, ColumnMappings, Result, SqlDbType, SqlTaskError, Value};
use tiberius::{ColumnData, TokenRow};

use crate::connection::{
    MssqlClient, MssqlConnection, MssqlConnectionError, catch_driver_panic, param_refs,
};
use crate::convert::{TiberiusParam, parse_numeric, value_to_column_data};
use crate::dialect::{INSERT_TRIGGERS_SQL, MssqlDialect, TABLE_COLUMNS_SQL};

/// A column of the destination table
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DestinationColumn {
    pub name: String,
    pub type_name: String,
    /// `None` for types without a parameter type, such as `sql_variant`
    pub db_type: Option<SqlDbType>,
    pub scale: u8,
    pub is_identity: bool,
    pub is_computed: bool,
}

impl DestinationColumn {
    pub(crate) fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            db_type: type_name.parse().ok(),
            scale: 0,
            is_identity: false,
            is_computed: false,
        }
    }

    fn is_rowversion(&self) -> bool {
        self.type_name.eq_ignore_ascii_case("timestamp")
            || self.type_name.eq_ignore_ascii_case("rowversion")
    }

    /// CLR types whose metadata the bulk load request cannot decode
    pub(crate) fn is_clr_type(&self) -> bool {
        ["geometry", "geography", "hierarchyid"]
            .iter()
            .any(|t| self.type_name.eq_ignore_ascii_case(t))
    }

    /// Whether a transfer may supply values for this column
    pub(crate) fn accepts_values(&self, keep_identity: bool) -> bool {
        !self.is_computed && !self.is_rowversion() && (keep_identity || !self.is_identity)
    }
}

/// A writable destination column and the source column feeding it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundColumn {
    pub column: DestinationColumn,
    /// Index into each source row; `None` leaves the column to the server
    pub source: Option<usize>,
}

/// Pair every writable destination column with its source column
pub(crate) fn resolve_columns(
    plan: &BulkLoadPlan,
    columns: Vec<DestinationColumn>,
) -> Result<Vec<BoundColumn>> {
    let (writable, read_only): (Vec<_>, Vec<_>) = columns
        .into_iter()
        .partition(|c| c.accepts_values(plan.flags.keep_identity));
    let mut bound: Vec<BoundColumn> = writable
        .into_iter()
        .map(|column| BoundColumn {
            column,
            source: None,
        })
        .collect();

    match &plan.mappings {
        ColumnMappings::Positional => {
            if plan.source_columns.len() > bound.len() {
                return Err(SqlTaskError::Query(format!(
                    "the input has {} columns but {} has only {} writable columns",
                    plan.source_columns.len(),
                    plan.table,
                    bound.len()
                )));
            }
            for (index, binding) in bound.iter_mut().take(plan.source_columns.len()).enumerate() {
                binding.source = Some(index);
            }
        }
        ColumnMappings::Explicit(mappings) => {
            for mapping in mappings {
                let source = plan.source_index(&mapping.source).ok_or_else(|| {
                    SqlTaskError::Query(format!(
                        "mapped source column '{}' is not present in the input",
                        mapping.source
                    ))
                })?;
                let Some(binding) = bound
                    .iter_mut()
                    .find(|b| b.column.name == mapping.destination)
                else {
                    let reason = if read_only.iter().any(|c| c.name == mapping.destination) {
                        "cannot be written"
                    } else {
                        "does not exist"
                    };
                    return Err(SqlTaskError::Query(format!(
                        "destination column '{}' of {} {}",
                        mapping.destination, plan.table, reason
                    )));
                };
                if binding.source.is_some() {
                    return Err(SqlTaskError::Query(format!(
                        "destination column '{}' is mapped more than once",
                        mapping.destination
                    )));
                }
                binding.source = Some(source);
            }
        }
    }

    Ok(bound)
}

/// Whether the transfer can use the bulk load protocol
pub(crate) fn uses_bulk_protocol(plan: &BulkLoadPlan, bound: &[BoundColumn]) -> bool {
    plan.flags.is_default()
        && bound.iter().all(|b| b.source.is_some())
        && !bound.iter().any(|b| b.column.is_clr_type())
}

/// How rows reach the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferPath {
    BulkProtocol,
    RowInserts {
        /// Disable the table's `INSERT` triggers around the inserts
        suppress_triggers: bool,
    },
}

pub(crate) fn transfer_path(plan: &BulkLoadPlan, bound: &[BoundColumn]) -> TransferPath {
    if uses_bulk_protocol(plan, bound) {
        TransferPath::BulkProtocol
    } else {
        TransferPath::RowInserts {
            suppress_triggers: !plan.flags.fire_triggers,
        }
    }
}

/// Column data for a destination column, coerced to the column's type
pub(crate) fn bulk_column_data(
    column: &DestinationColumn,
    value: Value,
) -> std::result::Result<ColumnData<'static>, MssqlConnectionError> {
    let value = match column.db_type {
        Some(db_type) => db_type.coerce(value).map_err(|e| {
            MssqlConnectionError::TypeConversion(format!("column '{}': {}", column.name, e))
        })?,
        None => value,
    };
    match (column.db_type, value) {
        (Some(SqlDbType::Decimal), Value::Decimal(text)) => {
            Ok(ColumnData::Numeric(Some(parse_numeric(&text, column.scale)?)))
        }
        (Some(SqlDbType::Money), Value::Decimal(text)) => text
            .trim()
            .parse::<f64>()
            .map(|v| ColumnData::F64(Some(v)))
            .map_err(|_| {
                MssqlConnectionError::TypeConversion(format!("'{}' is not a valid money value", text))
            }),
        (db_type, value) => value_to_column_data(value, db_type),
    }
}

fn source_value(row: &[Value], source: Option<usize>) -> Value {
    source
        .and_then(|index| row.get(index))
        .cloned()
        .unwrap_or(Value::Null)
}

fn row_failed(index: usize, err: impl Into<SqlTaskError>) -> SqlTaskError {
    let err: SqlTaskError = err.into();
    match err {
        SqlTaskError::Binding(msg) => SqlTaskError::Binding(format!("row {}: {}", index, msg)),
        other => other,
    }
}

async fn load_destination_columns(
    client: &mut MssqlClient,
    table: &str,
) -> std::result::Result<Vec<DestinationColumn>, MssqlConnectionError> {
    let rows = client
        .query(TABLE_COLUMNS_SQL, &[&table])
        .await?
        .into_first_result()
        .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: &str = row.try_get(0)?.unwrap_or_default();
        let type_name: &str = row.try_get(1)?.unwrap_or_default();
        let mut column = DestinationColumn::new(name, type_name);
        column.scale = row.try_get(2)?.unwrap_or_default();
        column.is_identity = row.try_get(3)?.unwrap_or_default();
        column.is_computed = row.try_get(4)?.unwrap_or_default();
        columns.push(column);
    }
    Ok(columns)
}

/// Transfer every row of `plan` into its destination table.
///
/// Returns the number of rows sent. `progress` sees the running count each
/// time the plan's notification interval is reached.
pub(crate) async fn bulk_load(
    connection: &MssqlConnection,
    plan: &BulkLoadPlan,
    progress: &mut (dyn FnMut(u64) + Send),
) -> Result<u64> {
    let start = std::time::Instant::now();
    let dialect = connection.dialect();
    let table = dialect.quote_object_name(&plan.table);

    let shared = connection.shared_client();
    let mut guard = shared.lock().await;
    let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

    let copied = match catch_driver_panic(
        "bulk load",
        transfer(client, dialect, &table, plan, progress),
    )
    .await
    {
        Ok(copied) => copied,
        Err(panicked) => {
            guard.take();
            Err(panicked.into())
        }
    };

    match &copied {
        Ok(copied) => tracing::debug!(
            rows_copied = *copied,
            duration_ms = start.elapsed().as_millis() as u64,
            "bulk load completed"
        ),
        Err(e) => tracing::error!(error = %e, "bulk load failed"),
    }
    copied
}

async fn transfer(
    client: &mut MssqlClient,
    dialect: &MssqlDialect,
    table: &str,
    plan: &BulkLoadPlan,
    progress: &mut (dyn FnMut(u64) + Send),
) -> Result<u64> {
    let columns = load_destination_columns(client, table).await?;
    if columns.is_empty() {
        return Err(SqlTaskError::Query(format!(
            "destination table {} does not exist or has no columns",
            plan.table
        )));
    }
    let bound = resolve_columns(plan, columns)?;

    let path = transfer_path(plan, &bound);
    tracing::debug!(
        table = %table,
        row_count = plan.row_count(),
        path = ?path,
        "starting bulk load"
    );

    match path {
        TransferPath::BulkProtocol => send_bulk(client, table, plan, &bound, progress).await,
        TransferPath::RowInserts { suppress_triggers } => {
            let triggers = if suppress_triggers {
                load_insert_triggers(client, table).await?
            } else {
                Vec::new()
            };
            set_triggers(client, dialect, &plan.table, &triggers, false).await?;
            let result = insert_rows(client, dialect, plan, &bound, progress).await;
            if let Err(e) = set_triggers(client, dialect, &plan.table, &triggers, true).await {
                tracing::warn!(error = %e, "failed to re-enable triggers");
            }
            result
        }
    }
}

/// Enabled `INSERT` triggers of `table` as (schema, name)
async fn load_insert_triggers(
    client: &mut MssqlClient,
    table: &str,
) -> std::result::Result<Vec<(String, String)>, MssqlConnectionError> {
    let rows = client
        .query(INSERT_TRIGGERS_SQL, &[&table])
        .await?
        .into_first_result()
        .await?;
    let mut triggers = Vec::with_capacity(rows.len());
    for row in rows {
        let schema: Option<&str> = row.try_get(0)?;
        let name: Option<&str> = row.try_get(1)?;
        if let (Some(schema), Some(name)) = (schema, name) {
            triggers.push((schema.to_string(), name.to_string()));
        }
    }
    Ok(triggers)
}

async fn set_triggers(
    client: &mut MssqlClient,
    dialect: &MssqlDialect,
    table: &str,
    triggers: &[(String, String)],
    enabled: bool,
) -> std::result::Result<(), MssqlConnectionError> {
    for (schema, name) in triggers {
        let sql = dialect.toggle_trigger(table, schema, name, enabled);
        tracing::debug!(trigger = %name, enabled, "toggling trigger");
        client.simple_query(sql).await?.into_results().await?;
    }
    Ok(())
}

async fn send_bulk(
    client: &mut MssqlClient,
    table: &str,
    plan: &BulkLoadPlan,
    bound: &[BoundColumn],
    progress: &mut (dyn FnMut(u64) + Send),
) -> Result<u64> {
    let mut request = client
        .bulk_insert(table)
        .await
        .map_err(MssqlConnectionError::from)?;

    let mut copied = 0u64;
    for (index, row) in plan.rows.iter().enumerate() {
        let mut token_row = TokenRow::new();
        for binding in bound {
            let data = bulk_column_data(&binding.column, source_value(row, binding.source))
                .map_err(|e| row_failed(index, e))?;
            token_row.push(data);
        }
        request
            .send(token_row)
            .await
            .map_err(MssqlConnectionError::from)?;
        copied += 1;
        if plan.should_notify(copied) {
            progress(copied);
        }
    }

    let result = request.finalize().await.map_err(MssqlConnectionError::from)?;
    tracing::debug!(
        rows_affected = result.rows_affected().iter().sum::<u64>(),
        "bulk request finalized"
    );
    Ok(copied)
}

async fn insert_rows(
    client: &mut MssqlClient,
    dialect: &MssqlDialect,
    plan: &BulkLoadPlan,
    bound: &[BoundColumn],
    progress: &mut (dyn FnMut(u64) + Send),
) -> Result<u64> {
    let identity_insert = plan.flags.keep_identity
        && bound
            .iter()
            .any(|b| b.column.is_identity && b.source.is_some());
    if identity_insert {
        set_identity_insert(client, dialect, &plan.table, true).await?;
    }

    let result = insert_each_row(client, dialect, plan, bound, progress).await;

    if identity_insert {
        if let Err(e) = set_identity_insert(client, dialect, &plan.table, false).await {
            tracing::warn!(error = %e, "failed to turn IDENTITY_INSERT off");
        }
    }
    result
}

async fn insert_each_row(
    client: &mut MssqlClient,
    dialect: &MssqlDialect,
    plan: &BulkLoadPlan,
    bound: &[BoundColumn],
    progress: &mut (dyn FnMut(u64) + Send),
) -> Result<u64> {
    let mut copied = 0u64;
    for (index, row) in plan.rows.iter().enumerate() {
        let mut names = Vec::with_capacity(bound.len());
        let mut params = Vec::with_capacity(bound.len());
        for binding in bound.iter().filter(|b| b.source.is_some()) {
            let value = source_value(row, binding.source);
            // Leaving a null column out lets the server apply its default.
            if value.is_null() && !plan.flags.keep_nulls {
                continue;
            }
            let data = bulk_column_data(&binding.column, value).map_err(|e| row_failed(index, e))?;
            names.push(binding.column.name.as_str());
            params.push(TiberiusParam(data));
        }

        let sql = dialect.insert_row(&plan.table, &names, plan.flags.table_lock);
        client
            .execute(sql, &param_refs(&params))
            .await
            .map_err(MssqlConnectionError::from)?;
        copied += 1;
        if plan.should_notify(copied) {
            progress(copied);
        }
    }
    Ok(copied)
}

/// `SET IDENTITY_INSERT` must run as a plain batch to outlive the statement.
async fn set_identity_insert(
    client: &mut MssqlClient,
    dialect: &MssqlDialect,
    table: &str,
    enabled: bool,
) -> Result<()> {
    client
        .simple_query(dialect.identity_insert(table, enabled))
        .await
        .map_err(MssqlConnectionError::from)?
        .into_results()
        .await
        .map_err(MssqlConnectionError::from)?;
    Ok(())
}
