//! MS SQL Server driver for sqltask
//!
//! This crate provides the tiberius-backed implementation of the
//! `sqltask-core` connection traits: statements, stored procedures,
//! transactions at a chosen isolation level, and bulk table transfers.

mod bulk;
mod connection;
mod convert;
mod dialect;
mod driver;
mod transaction;

#[cfg(test)]
mod bulk_tests;
#[cfg(test)]
mod convert_tests;
#[cfg(test)]
mod dialect_tests;
#[cfg(test)]
mod driver_tests;

pub use connection::{MssqlConnection, MssqlConnectionError};
pub use dialect::MssqlDialect;
pub use driver::MssqlDriver;
pub use transaction::MssqlTransaction;
