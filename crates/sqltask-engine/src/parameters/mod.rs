//! T-SQL parameter extraction and binding
//!
//! Batch statements name their parameters `@name`; the driver takes positional
//! `@P1..@Pn`. The binder rewrites the statement once and then turns each
//! caller row into the positional values, matching fields case-insensitively.
//!
//! # Example
//!
//! ```
//! use sqltask_engine::parameters::PreparedStatement;
//!
//! let prepared = PreparedStatement::parse(
//!     "UPDATE t SET name = @name WHERE id = @id OR parent_id = @ID",
//! )
//! .unwrap();
//! assert_eq!(
//!     prepared.sql,
//!     "UPDATE t SET name = @P1 WHERE id = @P2 OR parent_id = @P2"
//! );
//! ```

pub mod binder;
mod extractor;

pub use binder::{
    BindError, BindResult, PreparedStatement, bind_procedure_parameters,
    normalize_parameter_name,
};
pub use extractor::{Placeholder, extract_parameters, find_placeholders};
