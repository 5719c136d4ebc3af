//! Bulk load plan handed from the engine to a driver

use serde::{Deserialize, Serialize};

use crate::Value;

/// Server-side options for a bulk transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkCopyFlags {
    /// Run insert triggers on the destination table
    pub fire_triggers: bool,
    /// Keep identity values from the source instead of generating new ones
    pub keep_identity: bool,
    /// Take a table lock for the duration of the transfer
    pub table_lock: bool,
    /// Keep nulls instead of applying column defaults
    pub keep_nulls: bool,
}

impl BulkCopyFlags {
    /// True when every flag has its default value
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One source-to-destination column pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub destination: String,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Resolved column mappings for a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMappings {
    /// Source column `i` goes to destination column `i`
    Positional,
    /// Only the listed pairs are transferred
    Explicit(Vec<ColumnMapping>),
}

/// A fully resolved table transfer
#[derive(Debug, Clone)]
pub struct BulkLoadPlan {
    /// Destination table name as given by the caller
    pub table: String,
    /// Source column names, in the order of each row's values
    pub source_columns: Vec<String>,
    /// Source rows, each aligned with `source_columns`
    pub rows: Vec<Vec<Value>>,
    pub mappings: ColumnMappings,
    pub flags: BulkCopyFlags,
    /// Report progress every this many rows; 0 disables notification
    pub notify_after: u64,
}

impl BulkLoadPlan {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a source column by exact name
    pub fn source_index(&self, name: &str) -> Option<usize> {
        self.source_columns.iter().position(|c| c == name)
    }

    /// Whether the driver should notify after `copied` rows
    pub fn should_notify(&self, copied: u64) -> bool {
        self.notify_after > 0 && copied > 0 && copied % self.notify_after == 0
    }
}
