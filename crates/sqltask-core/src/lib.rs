//! sqltask core - shared abstractions for transactional task execution
//!
//! This crate provides the fundamental traits and types that the driver and
//! engine crates depend on. It defines:
//!
//! - `Connection` / `Transaction` - async traits a database driver implements
//! - `ConnectionFactory` - opens one connection per invocation and owns pool flushing
//! - `IsolationLevel` / `NativeIsolation` - caller-facing and engine-native isolation levels
//! - `SqlParam` / `SqlDbType` - typed statement parameters
//! - `BulkLoadPlan` - a resolved table transfer handed to the driver
//! - Common types like `Value`, `Row`, `RowMap`, `QueryResult`

mod bulk;
mod connection;
mod driver;
mod error;
mod isolation;
mod params;
pub mod spatial;
mod types;

pub use bulk::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use isolation::*;
pub use params::*;
pub use spatial::{HexSpatialFormatter, SpatialFormatter, SpatialKind, SpatialValue};
pub use types::*;
