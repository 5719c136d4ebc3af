//! Connection targets and the factory that opens connections

use crate::{Connection, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Opens connections for invocations.
///
/// One connection is opened per invocation and closed when it ends. After the
/// connection is closed the runner calls [`ConnectionFactory::flush_pool`] so a
/// pooled session whose authentication or session state may have been damaged
/// is never handed to the next invocation.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Driver identifier (e.g., "mssql")
    fn id(&self) -> &'static str;

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Discard any idle pooled connections.
    ///
    /// Factories that do not pool connections keep the default no-op.
    async fn flush_pool(&self) {}
}

/// Where and how to connect
#[derive(Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// ADO.NET-style connection string; when set it takes precedence over the fields below
    pub connection_string: Option<String>,
    /// Host address
    pub host: String,
    /// Port number (0 for the driver default)
    pub port: u16,
    /// Database name
    pub database: Option<String>,
    /// Username
    pub username: Option<String>,
    /// Password
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Additional connection parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration from discrete fields
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    /// Create a configuration from a connection string
    pub fn from_connection_string(conn_str: impl Into<String>) -> Self {
        Self {
            connection_string: Some(conn_str.into()),
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let val = value.into();
        let str_val = match val {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter ("true"/"1"/"yes")
    pub fn get_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    /// Host and database for log fields; never includes credentials
    pub fn describe(&self) -> String {
        match &self.connection_string {
            Some(_) => "<connection string>".to_string(),
            None => format!(
                "{}:{}/{}",
                self.host,
                self.port,
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("target", &self.describe())
            .field("username", &self.username)
            .finish()
    }
}

/// A connection target is either a bare connection string or a field object
#[derive(Deserialize)]
#[serde(untagged)]
enum ConnectionTargetRepr {
    ConnectionString(String),
    Fields {
        #[serde(default, rename = "connectionString")]
        connection_string: Option<String>,
        #[serde(default)]
        host: String,
        #[serde(default)]
        port: u16,
        #[serde(default)]
        database: Option<String>,
        #[serde(default, alias = "user")]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        params: HashMap<String, String>,
    },
}

impl<'de> Deserialize<'de> for ConnectionConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match ConnectionTargetRepr::deserialize(deserializer)? {
            ConnectionTargetRepr::ConnectionString(s) => ConnectionConfig::from_connection_string(s),
            ConnectionTargetRepr::Fields {
                connection_string,
                host,
                port,
                database,
                username,
                password,
                params,
            } => ConnectionConfig {
                connection_string,
                host,
                port,
                database,
                username,
                password,
                params,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_connection_string() {
        let config: ConnectionConfig =
            serde_json::from_str("\"Server=tcp:db,1433;User Id=sa;Password=x\"").unwrap();
        assert_eq!(
            config.connection_string.as_deref(),
            Some("Server=tcp:db,1433;User Id=sa;Password=x")
        );
    }

    #[test]
    fn test_deserialize_fields() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"host":"db","port":1433,"database":"app","user":"sa","password":"pw","params":{"trust_cert":"true"}}"#,
        )
        .unwrap();
        assert_eq!(config.host, "db");
        assert_eq!(config.get_string("user").as_deref(), Some("sa"));
        assert!(config.get_bool("trust_cert"));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ConnectionConfig::new("db", 1433).with_credentials("sa", "secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("db:1433"));
    }

    #[test]
    fn test_serialize_skips_password() {
        let config = ConnectionConfig::new("db", 1433).with_credentials("sa", "secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
