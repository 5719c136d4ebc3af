//! T-SQL text generation for MS SQL Server
//!
//! This module provides the `MssqlDialect` struct with utility methods for
//! generating the T-SQL the driver sends on the caller's behalf: identifier
//! quoting, procedure calls, row inserts and transaction control.

use sqltask_core::NativeIsolation;

/// Query listing the columns of a table, in ordinal order.
///
/// Alias types report their base type; CLR types such as `geometry` report
/// their own name.
pub(crate) const TABLE_COLUMNS_SQL: &str = "SELECT c.name, COALESCE(bt.name, ut.name), c.scale, \
     c.is_identity, c.is_computed \
     FROM sys.columns c \
     JOIN sys.types ut ON ut.user_type_id = c.user_type_id \
     LEFT JOIN sys.types bt ON bt.user_type_id = c.system_type_id \
     WHERE c.object_id = OBJECT_ID(@P1) \
     ORDER BY c.column_id";

/// Query listing the enabled `INSERT` triggers of a table as schema and name
pub(crate) const INSERT_TRIGGERS_SQL: &str = "SELECT OBJECT_SCHEMA_NAME(tr.object_id), tr.name \
     FROM sys.triggers tr \
     JOIN sys.trigger_events te ON te.object_id = tr.object_id \
     WHERE tr.parent_id = OBJECT_ID(@P1) AND tr.is_disabled = 0 AND te.type_desc = N'INSERT' \
     ORDER BY tr.name";

/// T-SQL dialect implementation for MS SQL Server
///
/// # Example
///
/// ```
/// use sqltask_driver_mssql::MssqlDialect;
///
/// let dialect = MssqlDialect::new();
///
/// // Quote an identifier using square brackets
/// assert_eq!(dialect.quote_identifier("table"), "[table]");
///
/// // Multi-part names are quoted part by part
/// assert_eq!(dialect.quote_object_name("dbo.Orders"), "[dbo].[Orders]");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MS SQL Server dialect instance
    pub fn new() -> Self {
        Self
    }

    /// Quote an identifier using SQL Server's square bracket syntax
    ///
    /// SQL Server uses `[` and `]` as identifier delimiters. This method
    /// handles identifiers that contain the closing bracket by doubling them.
    ///
    /// # Example
    ///
    /// ```
    /// use sqltask_driver_mssql::MssqlDialect;
    ///
    /// let dialect = MssqlDialect::new();
    /// assert_eq!(dialect.quote_identifier("users"), "[users]");
    /// assert_eq!(dialect.quote_identifier("user[data]"), "[user[data]]]");
    /// ```
    pub fn quote_identifier(&self, ident: &str) -> String {
        let escaped = ident.replace(']', "]]");
        format!("[{}]", escaped)
    }

    /// Quote a string literal using single quotes
    pub fn quote_string(&self, s: &str) -> String {
        let escaped = s.replace('\'', "''");
        format!("'{}'", escaped)
    }

    /// Split a possibly multi-part name (`db.schema.object`) into its parts.
    ///
    /// Dots inside bracketed parts do not split, and bracketed parts are
    /// returned unquoted (`[a]]b]` becomes `a]b`).
    pub fn split_object_name(&self, name: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = name.trim().chars().peekable();
        let mut in_brackets = false;

        while let Some(c) = chars.next() {
            match c {
                '[' if !in_brackets && current.is_empty() => in_brackets = true,
                ']' if in_brackets => {
                    if chars.peek() == Some(&']') {
                        chars.next();
                        current.push(']');
                    } else {
                        in_brackets = false;
                    }
                }
                '.' if !in_brackets => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        parts.push(current);
        parts
    }

    /// Quote every part of a multi-part object name
    ///
    /// # Example
    ///
    /// ```
    /// use sqltask_driver_mssql::MssqlDialect;
    ///
    /// let dialect = MssqlDialect::new();
    /// assert_eq!(dialect.quote_object_name("[dbo].[Order Lines]"), "[dbo].[Order Lines]");
    /// ```
    pub fn quote_object_name(&self, name: &str) -> String {
        self.split_object_name(name)
            .iter()
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Positional placeholder for the 1-based parameter index
    pub fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    /// `EXEC` statement for a stored procedure with named arguments.
    ///
    /// Each argument is passed by name and bound to the next positional
    /// placeholder, so argument order in the call does not matter.
    pub fn exec_procedure(&self, procedure: &str, param_names: &[&str]) -> String {
        let mut sql = format!("EXEC {}", self.quote_object_name(procedure));
        let args: Vec<String> = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} = {}", name, self.placeholder(i + 1)))
            .collect();
        if !args.is_empty() {
            sql.push(' ');
            sql.push_str(&args.join(", "));
        }
        sql
    }

    /// Single-row parameterized `INSERT`
    pub fn insert_row(&self, table: &str, columns: &[&str], table_lock: bool) -> String {
        let hint = if table_lock { " WITH (TABLOCK)" } else { "" };
        if columns.is_empty() {
            return format!("INSERT INTO {}{} DEFAULT VALUES", self.quote_object_name(table), hint);
        }
        let cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        format!(
            "INSERT INTO {}{} ({}) VALUES ({})",
            self.quote_object_name(table),
            hint,
            cols.join(", "),
            placeholders.join(", ")
        )
    }

    pub fn identity_insert(&self, table: &str, enabled: bool) -> String {
        format!(
            "SET IDENTITY_INSERT {} {}",
            self.quote_object_name(table),
            if enabled { "ON" } else { "OFF" }
        )
    }

    /// `DISABLE TRIGGER` or `ENABLE TRIGGER` for one trigger of `table`
    pub fn toggle_trigger(&self, table: &str, schema: &str, trigger: &str, enabled: bool) -> String {
        format!(
            "{} TRIGGER {}.{} ON {}",
            if enabled { "ENABLE" } else { "DISABLE" },
            self.quote_identifier(schema),
            self.quote_identifier(trigger),
            self.quote_object_name(table)
        )
    }

    /// Batch that sets the isolation level (when one is given) and opens a transaction
    pub fn begin_transaction(&self, isolation: NativeIsolation) -> String {
        match isolation.set_statement() {
            Some(set) => format!("{}; BEGIN TRANSACTION", set),
            None => "BEGIN TRANSACTION".to_string(),
        }
    }

    pub fn commit_transaction(&self) -> &'static str {
        "COMMIT TRANSACTION"
    }

    pub fn rollback_transaction(&self) -> &'static str {
        "ROLLBACK TRANSACTION"
    }
}
