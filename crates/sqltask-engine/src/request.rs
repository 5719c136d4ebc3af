//! Invocation request and result

use serde::{Deserialize, Serialize};
use sqltask_core::{ConnectionConfig, RowMap, Value};

use crate::options::{
    BatchOptions, BulkLoadOptions, CommonOptions, ProcedureOptions, ProcedureParameter,
};
use crate::rows::RowSource;

/// One invocation: where to connect and the single operation to run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub connection_target: ConnectionConfig,
    #[serde(flatten)]
    pub operation: Operation,
}

impl ExecutionRequest {
    pub fn new(connection_target: ConnectionConfig, operation: Operation) -> Self {
        Self {
            connection_target,
            operation,
        }
    }

    /// Parse a request from its JSON form
    pub fn from_json(text: &str) -> sqltask_core::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The operation a request runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Operation {
    /// A parameterized statement run once per input row
    #[serde(rename_all = "camelCase")]
    Batch {
        statement: String,
        /// Absent means run the statement once without parameters
        #[serde(default)]
        rows: Option<RowSource>,
        #[serde(default)]
        options: BatchOptions,
    },
    /// An in-memory table streamed into a destination table
    #[serde(rename_all = "camelCase")]
    BulkLoad {
        table: String,
        table_data: RowSource,
        #[serde(default)]
        options: BulkLoadOptions,
    },
    /// A stored procedure invocation
    #[serde(rename_all = "camelCase")]
    Procedure {
        procedure: String,
        #[serde(default)]
        parameters: Vec<ProcedureParameter>,
        #[serde(default)]
        options: ProcedureOptions,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Batch { .. } => OperationKind::Batch,
            Operation::BulkLoad { .. } => OperationKind::BulkLoad,
            Operation::Procedure { .. } => OperationKind::Procedure,
        }
    }

    pub fn common_options(&self) -> &CommonOptions {
        match self {
            Operation::Batch { options, .. } => &options.common,
            Operation::BulkLoad { options, .. } => &options.common,
            Operation::Procedure { options, .. } => &options.common,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Batch,
    BulkLoad,
    Procedure,
}

impl OperationKind {
    /// Label used at the start of failure messages
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Batch => "Batch execution",
            OperationKind::BulkLoad => "Bulk load",
            OperationKind::Procedure => "Stored procedure execution",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Payload returned with a successful result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultData {
    Rows(Vec<RowMap>),
    Scalar(Value),
}

/// Outcome of an invocation that did not raise.
///
/// `error_message` is set exactly when `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    success: bool,
    affected: u64,
    error_message: Option<String>,
    data: Option<ResultData>,
}

impl ExecutionResult {
    pub fn succeeded(affected: u64, data: Option<ResultData>) -> Self {
        Self {
            success: true,
            affected,
            error_message: None,
            data,
        }
    }

    pub fn failed(affected: u64, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            affected,
            error_message: Some(error_message.into()),
            data: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn affected(&self) -> u64 {
        self.affected
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn data(&self) -> Option<&ResultData> {
        self.data.as_ref()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": self.success,
            "affected": self.affected,
            "errorMessage": self.error_message,
            "data": self.data,
        })
    }
}
