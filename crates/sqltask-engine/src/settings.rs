//! Engine-wide defaults loaded from TOML
//!
//! ```toml
//! command_timeout_seconds = 60
//! isolation_level = "ReadCommitted"
//! flush_pool = true
//! procedure_result_mode = "reader"
//! throw_on_failure = false
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqltask_core::{IsolationLevel, Result, SqlTaskError};

use crate::options::ProcedureResultMode;

/// Defaults applied to requests that leave an option unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 0 disables the command timeout
    pub command_timeout_seconds: u64,
    pub isolation_level: IsolationLevel,
    /// Discard idle pooled connections after every invocation
    pub flush_pool: bool,
    pub procedure_result_mode: ProcedureResultMode,
    pub throw_on_failure: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command_timeout_seconds: 30,
            isolation_level: IsolationLevel::Default,
            flush_pool: true,
            procedure_result_mode: ProcedureResultMode::NoResult,
            throw_on_failure: false,
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| SqlTaskError::Configuration(format!("invalid engine settings: {}", e)))
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), ?settings, "engine settings loaded");
        Ok(settings)
    }
}
