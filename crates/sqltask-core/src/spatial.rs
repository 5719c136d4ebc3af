//! Geometry and geography values
//!
//! Spatial values cannot be represented by the structured result payload, so
//! anything returned to the caller goes through a `SpatialFormatter` first.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::hex_literal;

/// Which spatial type a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialKind {
    Geometry,
    Geography,
}

/// A spatial value as the server serialized it
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialValue {
    pub kind: SpatialKind,
    /// Spatial reference identifier
    pub srid: i32,
    /// Serialized shape bytes
    pub bytes: Vec<u8>,
}

impl SpatialValue {
    pub fn new(kind: SpatialKind, srid: i32, bytes: Vec<u8>) -> Self {
        Self { kind, srid, bytes }
    }
}

impl std::fmt::Display for SpatialValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SRID={};{}", self.srid, hex_literal(&self.bytes))
    }
}

/// Turns a spatial value into the text placed in results
pub trait SpatialFormatter: Send + Sync {
    fn format(&self, value: &SpatialValue) -> Result<String>;
}

/// Default formatter: `SRID=<srid>;0x<serialized bytes>`
#[derive(Debug, Clone, Copy, Default)]
pub struct HexSpatialFormatter;

impl SpatialFormatter for HexSpatialFormatter {
    fn format(&self, value: &SpatialValue) -> Result<String> {
        Ok(value.to_string())
    }
}
