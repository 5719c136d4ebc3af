//! Caller row data
//!
//! Rows arrive either as a serialized JSON document or already inline in the
//! request. Both forms must be an array of flat objects.

use serde::{Deserialize, Serialize};
use sqltask_core::{Result, RowMap, SqlTaskError, Value};

/// Row data as it appears in a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowSource {
    /// A JSON document held in a string
    Serialized(String),
    /// The JSON array itself
    Inline(serde_json::Value),
}

impl RowSource {
    /// Parse into ordered rows
    pub fn parse(&self) -> Result<Vec<RowMap>> {
        match self {
            RowSource::Serialized(text) => parse_rows(text),
            RowSource::Inline(json) => rows_from_json(json.clone()),
        }
    }
}

impl From<Vec<RowMap>> for RowSource {
    fn from(rows: Vec<RowMap>) -> Self {
        let array = rows
            .into_iter()
            .map(|row| {
                serde_json::Value::Object(
                    row.into_iter()
                        .map(|(name, value)| (name, value.to_json()))
                        .collect(),
                )
            })
            .collect();
        RowSource::Inline(serde_json::Value::Array(array))
    }
}

/// Parse a serialized array of rows
pub fn parse_rows(text: &str) -> Result<Vec<RowMap>> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| SqlTaskError::Binding(format!("row data is not valid JSON: {}", e)))?;
    rows_from_json(json)
}

/// Convert a JSON array of objects into rows, keeping field order
pub fn rows_from_json(json: serde_json::Value) -> Result<Vec<RowMap>> {
    let serde_json::Value::Array(items) = json else {
        return Err(SqlTaskError::Binding(
            "row data must be an array of objects".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(fields) => Ok(fields
                .into_iter()
                .map(|(name, value)| (name, Value::from_json(value)))
                .collect()),
            other => Err(SqlTaskError::Binding(format!(
                "row {} must be an object, found {}",
                index,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
