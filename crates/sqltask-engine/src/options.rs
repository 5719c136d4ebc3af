//! Per-operation options
//!
//! Every operation carries the shared options (timeout, isolation level,
//! throw-on-failure) plus its own. Shared options left unset inherit from
//! [`EngineSettings`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqltask_core::{BulkCopyFlags, ColumnMapping, IsolationLevel, SqlDbType, Value};

use crate::settings::EngineSettings;

/// Options every operation accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonOptions {
    /// Command timeout in seconds; 0 disables the timeout
    pub timeout_seconds: Option<u64>,
    pub isolation_level: Option<IsolationLevel>,
    /// Raise failures instead of returning a failure result
    pub throw_on_failure: Option<bool>,
}

impl CommonOptions {
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn with_throw_on_failure(mut self, throw: bool) -> Self {
        self.throw_on_failure = Some(throw);
        self
    }

    /// Fill unset options from the engine settings
    pub fn resolve(&self, settings: &EngineSettings) -> ResolvedOptions {
        let seconds = self
            .timeout_seconds
            .unwrap_or(settings.command_timeout_seconds);
        ResolvedOptions {
            timeout: (seconds > 0).then(|| Duration::from_secs(seconds)),
            isolation_level: self.isolation_level.unwrap_or(settings.isolation_level),
            throw_on_failure: self.throw_on_failure.unwrap_or(settings.throw_on_failure),
        }
    }
}

/// Shared options after settings have been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// `None` when no timeout applies
    pub timeout: Option<Duration>,
    pub isolation_level: IsolationLevel,
    pub throw_on_failure: bool,
}

/// Options for a batch statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
}

/// How input columns are matched to destination columns in a bulk load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "strategy")]
pub enum ColumnMappingStrategy {
    /// Input column `i` goes to destination column `i`
    Positional,
    /// Every input column goes to the destination column of the same name
    #[default]
    ByName,
    /// Only the listed pairs are transferred
    Manual { mappings: Vec<ColumnMapping> },
}

/// Options for a bulk load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkLoadOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
    pub fire_triggers: bool,
    pub keep_identity: bool,
    pub table_lock: bool,
    pub keep_nulls: bool,
    /// Rewrite empty string values to null before loading
    pub convert_empty_to_null: bool,
    /// Progress interval in rows: 0 picks a tenth of the input, negative disables
    pub notify_after: i64,
    pub column_mapping: ColumnMappingStrategy,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            common: CommonOptions::default(),
            fire_triggers: false,
            keep_identity: false,
            table_lock: false,
            keep_nulls: false,
            convert_empty_to_null: false,
            notify_after: 0,
            column_mapping: ColumnMappingStrategy::ByName,
        }
    }
}

impl BulkLoadOptions {
    pub fn flags(&self) -> BulkCopyFlags {
        BulkCopyFlags {
            fire_triggers: self.fire_triggers,
            keep_identity: self.keep_identity,
            table_lock: self.table_lock,
            keep_nulls: self.keep_nulls,
        }
    }

    /// Rows between progress notifications for an input of `row_count` rows.
    ///
    /// Returns 0 when notification is disabled.
    pub fn notify_interval(&self, row_count: usize) -> u64 {
        match self.notify_after {
            0 => (row_count as u64 / 10).max(1),
            n if n < 0 => 0,
            n => n as u64,
        }
    }
}

/// What a stored procedure invocation returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcedureResultMode {
    /// Only the affected row count
    #[default]
    #[serde(alias = "NoResult", alias = "none")]
    NoResult,
    /// First column of the first row
    #[serde(alias = "Scalar")]
    Scalar,
    /// Every row of every result set
    #[serde(alias = "Reader")]
    Reader,
}

/// Options for a stored procedure invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcedureOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
    /// Falls back to the engine settings when unset
    pub result_mode: Option<ProcedureResultMode>,
}

/// One stored procedure parameter as the caller supplied it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureParameter {
    pub name: String,
    #[serde(default = "null_value")]
    pub value: Value,
    /// Explicit database type; inferred from the value when absent
    #[serde(default, rename = "dbType", alias = "type")]
    pub db_type: Option<SqlDbType>,
}

fn null_value() -> Value {
    Value::Null
}

impl ProcedureParameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            db_type: None,
        }
    }

    pub fn typed(name: impl Into<String>, value: Value, db_type: SqlDbType) -> Self {
        Self {
            name: name.into(),
            value,
            db_type: Some(db_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_unset_options_inherit_settings() {
        let settings = EngineSettings::default();
        let resolved = CommonOptions::default().resolve(&settings);
        assert_eq!(resolved.timeout, Some(Duration::from_secs(30)));
        assert_eq!(resolved.isolation_level, IsolationLevel::Default);
        assert!(!resolved.throw_on_failure);
    }

    #[test]
    fn test_request_options_override_settings() {
        let options = CommonOptions::default()
            .with_timeout_seconds(0)
            .with_isolation_level(IsolationLevel::None)
            .with_throw_on_failure(true);
        let resolved = options.resolve(&EngineSettings::default());
        assert_eq!(resolved.timeout, None);
        assert_eq!(resolved.isolation_level, IsolationLevel::None);
        assert!(resolved.throw_on_failure);
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(0, 9, 1)]
    #[case(0, 25, 2)]
    #[case(0, 1000, 100)]
    #[case(-1, 1000, 0)]
    #[case(7, 1000, 7)]
    fn test_notify_interval(#[case] notify_after: i64, #[case] rows: usize, #[case] expected: u64) {
        let options = BulkLoadOptions {
            notify_after,
            ..Default::default()
        };
        assert_eq!(options.notify_interval(rows), expected);
    }

    #[test]
    fn test_bulk_options_deserialize() {
        let options: BulkLoadOptions = serde_json::from_str(
            r#"{
                "isolationLevel": "serializable",
                "throwOnFailure": true,
                "tableLock": true,
                "convertEmptyToNull": true,
                "notifyAfter": -1,
                "columnMapping": {
                    "strategy": "manual",
                    "mappings": [{"source": "Id", "destination": "CustomerId"}]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(options.common.isolation_level, Some(IsolationLevel::Serializable));
        assert_eq!(options.common.throw_on_failure, Some(true));
        assert!(options.table_lock);
        assert!(options.convert_empty_to_null);
        assert_eq!(options.notify_interval(50), 0);
        assert_eq!(
            options.column_mapping,
            ColumnMappingStrategy::Manual {
                mappings: vec![ColumnMapping::new("Id", "CustomerId")]
            }
        );
    }

    #[test]
    fn test_bulk_options_default_to_by_name() {
        let options: BulkLoadOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.column_mapping, ColumnMappingStrategy::ByName);
        assert!(options.flags().is_default());
    }

    #[test]
    fn test_procedure_parameter_deserialize() {
        let param: ProcedureParameter =
            serde_json::from_str(r#"{"name": "CustomerId", "value": "42", "dbType": "int"}"#)
                .unwrap();
        assert_eq!(param.db_type, Some(SqlDbType::Int));
        assert_eq!(param.value, Value::String("42".into()));

        let param: ProcedureParameter = serde_json::from_str(r#"{"name": "@Since"}"#).unwrap();
        assert_eq!(param.value, Value::Null);
        assert_eq!(param.db_type, None);
    }

    #[test]
    fn test_procedure_result_mode_names() {
        let mode: ProcedureResultMode = serde_json::from_str("\"reader\"").unwrap();
        assert_eq!(mode, ProcedureResultMode::Reader);
        let mode: ProcedureResultMode = serde_json::from_str("\"NoResult\"").unwrap();
        assert_eq!(mode, ProcedureResultMode::NoResult);
    }
}
