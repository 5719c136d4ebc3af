//! T-SQL Parameter Binder
//!
//! Turns caller rows into positional statement parameters and caller
//! procedure parameters into named, typed ones.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use sqltask_core::{RowMap, SqlParam, SqlTaskError, Value};
use thiserror::Error;

use super::extractor::find_placeholders;
use crate::options::ProcedureParameter;

/// Errors that can occur during parameter binding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    /// The statement is empty or only whitespace.
    #[error("the statement is empty")]
    EmptyStatement,

    /// A placeholder has no matching field in a row.
    #[error("row {row} has no value for parameter @{name}")]
    MissingParameter { name: String, row: usize },

    /// A procedure parameter name is not a valid T-SQL parameter name.
    #[error("'{0}' is not a valid parameter name")]
    InvalidParameterName(String),

    /// Two procedure parameters share a name.
    #[error("parameter {0} is supplied more than once")]
    DuplicateParameter(String),

    /// A value could not be converted to the parameter's declared type.
    #[error("parameter {name}: {message}")]
    Conversion { name: String, message: String },
}

/// Result type for parameter binding operations.
pub type BindResult<T> = Result<T, BindError>;

impl From<BindError> for SqlTaskError {
    fn from(err: BindError) -> Self {
        SqlTaskError::Binding(err.to_string())
    }
}

static PARAMETER_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[a-zA-Z_#][a-zA-Z0-9_#$]*$").expect("valid regex"));

/// A statement rewritten to positional placeholders, ready to bind rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    /// The statement with `@name` rewritten to `@P1`, `@P2`, ...
    pub sql: String,
    /// Parameter name for each positional slot, in slot order
    pub slots: Vec<String>,
}

impl PreparedStatement {
    /// Rewrite a statement's named placeholders.
    ///
    /// Every occurrence of a name, in any letter case, shares one slot.
    pub fn parse(statement: &str) -> BindResult<Self> {
        if statement.trim().is_empty() {
            return Err(BindError::EmptyStatement);
        }

        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut slots: Vec<String> = Vec::new();
        let mut sql = String::with_capacity(statement.len());
        let mut last_end = 0;

        for placeholder in find_placeholders(statement) {
            sql.push_str(&statement[last_end..placeholder.start]);
            let key = placeholder.name.to_lowercase();
            let position = match positions.get(&key) {
                Some(&position) => position,
                None => {
                    slots.push(placeholder.name.clone());
                    positions.insert(key, slots.len());
                    slots.len()
                }
            };
            sql.push_str(&format!("@P{}", position));
            last_end = placeholder.end;
        }
        sql.push_str(&statement[last_end..]);

        Ok(Self { sql, slots })
    }

    pub fn has_parameters(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Bind one row. Fields the statement does not reference are ignored.
    pub fn bind(&self, row: &RowMap, row_index: usize) -> BindResult<Vec<SqlParam>> {
        self.slots
            .iter()
            .map(|name| {
                lookup(row, name)
                    .cloned()
                    .map(SqlParam::positional)
                    .ok_or_else(|| BindError::MissingParameter {
                        name: name.clone(),
                        row: row_index,
                    })
            })
            .collect()
    }

    /// Bind every row up front, so bad input fails before any work starts
    pub fn bind_all(&self, rows: &[RowMap]) -> BindResult<Vec<Vec<SqlParam>>> {
        rows.iter()
            .enumerate()
            .map(|(index, row)| self.bind(row, index))
            .collect()
    }
}

/// Find a row field by parameter name: exact spelling first, then any case
fn lookup<'a>(row: &'a RowMap, name: &str) -> Option<&'a Value> {
    let name = name.strip_prefix('@').unwrap_or(name);
    row.get(name).or_else(|| {
        row.iter()
            .find(|(field, _)| {
                let field = field.strip_prefix('@').unwrap_or(field);
                field.eq_ignore_ascii_case(name)
            })
            .map(|(_, value)| value)
    })
}

/// Give a parameter name exactly one leading `@`
pub fn normalize_parameter_name(name: &str) -> String {
    format!("@{}", name.trim().trim_start_matches('@'))
}

/// Bind stored procedure parameters.
///
/// Explicitly typed values are converted to their type. A null keeps its
/// type so the server receives a typed null.
pub fn bind_procedure_parameters(parameters: &[ProcedureParameter]) -> BindResult<Vec<SqlParam>> {
    let mut seen = HashSet::new();
    let mut bound = Vec::with_capacity(parameters.len());

    for parameter in parameters {
        let name = normalize_parameter_name(&parameter.name);
        if !PARAMETER_NAME_REGEX.is_match(&name) {
            return Err(BindError::InvalidParameterName(parameter.name.clone()));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(BindError::DuplicateParameter(name));
        }

        let value = match parameter.db_type {
            Some(db_type) => {
                db_type
                    .coerce(parameter.value.clone())
                    .map_err(|e| BindError::Conversion {
                        name: name.clone(),
                        message: binding_detail(e),
                    })?
            }
            None => parameter.value.clone(),
        };
        bound.push(SqlParam::named(name, value, parameter.db_type));
    }

    Ok(bound)
}

fn binding_detail(err: SqlTaskError) -> String {
    match err {
        SqlTaskError::Binding(message) => message,
        other => other.to_string(),
    }
}
