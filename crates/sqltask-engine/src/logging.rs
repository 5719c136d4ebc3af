//! Tracing subscriber setup for hosts that embed the engine
//!
//! `RUST_LOG` takes precedence over the configured default filter.

use sqltask_core::{Result, SqlTaskError};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include file and line information
    pub include_location: bool,
    /// Log span creation and close, for timing invocations
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info,sqltask_engine=info,sqltask_driver_mssql=info".to_string(),
            json: false,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
        }
    }
}

impl LoggingConfig {
    /// JSON output for log collectors
    pub fn production() -> Self {
        Self {
            default_filter: "warn,sqltask_engine=info".to_string(),
            json: true,
            include_location: false,
            enable_spans: false,
        }
    }

    /// Verbose output with span timings
    pub fn development() -> Self {
        Self {
            default_filter: "debug".to_string(),
            include_location: true,
            enable_spans: true,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SqlTaskError::Configuration(format!("logging: {}", e)))?;

    tracing::debug!(json = config.json, "logging initialized");
    Ok(())
}
