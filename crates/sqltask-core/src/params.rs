//! Typed statement parameters

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, SqlTaskError, Value};

/// Target SQL Server type for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDbType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Money,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Text,
    NText,
    Xml,
    Date,
    Time,
    DateTime,
    DateTime2,
    SmallDateTime,
    DateTimeOffset,
    UniqueIdentifier,
    Binary,
    VarBinary,
}

impl SqlDbType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Money => "money",
            Self::Char => "char",
            Self::VarChar => "varchar",
            Self::NChar => "nchar",
            Self::NVarChar => "nvarchar",
            Self::Text => "text",
            Self::NText => "ntext",
            Self::Xml => "xml",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::DateTime2 => "datetime2",
            Self::SmallDateTime => "smalldatetime",
            Self::DateTimeOffset => "datetimeoffset",
            Self::UniqueIdentifier => "uniqueidentifier",
            Self::Binary => "binary",
            Self::VarBinary => "varbinary",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::VarChar
                | Self::NChar
                | Self::NVarChar
                | Self::Text
                | Self::NText
                | Self::Xml
        )
    }

    /// Convert a loosely-typed value into the value shape this type expects.
    ///
    /// Null stays null; the driver uses the type to send a typed null.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = |value: &Value| {
            SqlTaskError::Binding(format!(
                "cannot convert {} value '{}' to {}",
                value.type_name(),
                value,
                self.name()
            ))
        };

        let coerced = match self {
            Self::Bit => value.as_bool().map(Value::Bool),
            Self::TinyInt => value
                .as_i64()
                .and_then(|v| u8::try_from(v).ok())
                .map(Value::UInt8),
            Self::SmallInt => value
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(Value::Int16),
            Self::Int => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Int32),
            Self::BigInt => value.as_i64().map(Value::Int64),
            Self::Real => value.as_f64().map(|v| Value::Float32(v as f32)),
            Self::Float => value.as_f64().map(Value::Float64),
            Self::Decimal | Self::Money => match &value {
                Value::Decimal(_) => Some(value.clone()),
                Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                    Some(Value::Decimal(s.trim().to_string()))
                }
                other => other.as_f64().map(|_| Value::Decimal(other.to_string())),
            },
            t if t.is_text() => match &value {
                Value::String(_) => Some(value.clone()),
                Value::Json(j) => Some(Value::String(j.to_string())),
                Value::Bytes(_) | Value::Array(_) => None,
                other => Some(Value::String(other.to_string())),
            },
            Self::Date => match &value {
                Value::Date(_) => Some(value.clone()),
                Value::DateTime(dt) => Some(Value::Date(dt.date())),
                Value::String(s) => parse_date(s).map(Value::Date),
                _ => None,
            },
            Self::Time => match &value {
                Value::Time(_) => Some(value.clone()),
                Value::String(s) => parse_time(s).map(Value::Time),
                _ => None,
            },
            Self::DateTime | Self::DateTime2 | Self::SmallDateTime => match &value {
                Value::DateTime(_) => Some(value.clone()),
                Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
                Value::DateTimeOffset(dt) => Some(Value::DateTime(dt.naive_utc())),
                Value::String(s) => parse_datetime(s).map(Value::DateTime),
                _ => None,
            },
            Self::DateTimeOffset => match &value {
                Value::DateTimeOffset(_) => Some(value.clone()),
                Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(Value::DateTimeOffset),
                _ => None,
            },
            Self::UniqueIdentifier => match &value {
                Value::Uuid(_) => Some(value.clone()),
                Value::String(s) => uuid::Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
                _ => None,
            },
            Self::Binary | Self::VarBinary => match &value {
                Value::Bytes(_) => Some(value.clone()),
                Value::String(s) => parse_hex(s).map(Value::Bytes),
                _ => None,
            },
            _ => None,
        };

        coerced.ok_or_else(|| mismatch(&value))
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let digits = s.trim().strip_prefix("0x").or_else(|| s.trim().strip_prefix("0X"))?;
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

impl FromStr for SqlDbType {
    type Err = SqlTaskError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "bit" | "bool" | "boolean" => Self::Bit,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "int" | "integer" => Self::Int,
            "bigint" => Self::BigInt,
            "real" => Self::Real,
            "float" => Self::Float,
            "decimal" | "numeric" => Self::Decimal,
            "money" | "smallmoney" => Self::Money,
            "char" => Self::Char,
            "varchar" => Self::VarChar,
            "nchar" => Self::NChar,
            "nvarchar" => Self::NVarChar,
            "text" => Self::Text,
            "ntext" => Self::NText,
            "xml" => Self::Xml,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            "datetime2" => Self::DateTime2,
            "smalldatetime" => Self::SmallDateTime,
            "datetimeoffset" => Self::DateTimeOffset,
            "uniqueidentifier" | "guid" => Self::UniqueIdentifier,
            "binary" => Self::Binary,
            "varbinary" => Self::VarBinary,
            other => {
                return Err(SqlTaskError::Binding(format!(
                    "unknown database type '{}'",
                    other
                )));
            }
        };
        Ok(ty)
    }
}

impl std::fmt::Display for SqlDbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for SqlDbType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SqlDbType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A bound statement or procedure parameter
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
    /// Procedure parameter name including the leading `@`; `None` for positional
    pub name: Option<String>,
    pub value: Value,
    /// Explicit target type; `None` infers the type from the value
    pub db_type: Option<SqlDbType>,
}

impl SqlParam {
    pub fn positional(value: Value) -> Self {
        Self {
            name: None,
            value,
            db_type: None,
        }
    }

    pub fn named(name: impl Into<String>, value: Value, db_type: Option<SqlDbType>) -> Self {
        Self {
            name: Some(name.into()),
            value,
            db_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SqlDbType::Int, Value::String("42".into()), Value::Int32(42))]
    #[case(SqlDbType::BigInt, Value::Int32(7), Value::Int64(7))]
    #[case(SqlDbType::TinyInt, Value::Int64(255), Value::UInt8(255))]
    #[case(SqlDbType::Bit, Value::String("true".into()), Value::Bool(true))]
    #[case(SqlDbType::Float, Value::Int64(3), Value::Float64(3.0))]
    #[case(SqlDbType::Decimal, Value::String(" 12.50 ".into()), Value::Decimal("12.50".into()))]
    #[case(SqlDbType::NVarChar, Value::Int64(5), Value::String("5".into()))]
    #[case(SqlDbType::VarBinary, Value::String("0x0aff".into()), Value::Bytes(vec![0x0a, 0xff]))]
    fn test_coerce(#[case] ty: SqlDbType, #[case] input: Value, #[case] expected: Value) {
        assert_eq!(ty.coerce(input).unwrap(), expected);
    }

    #[test]
    fn test_coerce_null_stays_null() {
        assert_eq!(SqlDbType::Int.coerce(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_out_of_range_fails() {
        let err = SqlDbType::TinyInt.coerce(Value::Int64(300)).unwrap_err();
        assert!(err.is_binding());
        assert!(err.to_string().contains("tinyint"));
    }

    #[test]
    fn test_coerce_dates() {
        let value = SqlDbType::DateTime2
            .coerce(Value::String("2024-01-15 14:30:00".into()))
            .unwrap();
        assert!(matches!(value, Value::DateTime(_)));

        let value = SqlDbType::Date
            .coerce(Value::String("2024-01-15".into()))
            .unwrap();
        assert_eq!(
            value,
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
    }

    #[test]
    fn test_parse_type_names() {
        assert_eq!("NVarChar".parse::<SqlDbType>().unwrap(), SqlDbType::NVarChar);
        assert_eq!("guid".parse::<SqlDbType>().unwrap(), SqlDbType::UniqueIdentifier);
        assert!("geometry".parse::<SqlDbType>().is_err());
    }

    #[test]
    fn test_deserialize_type() {
        let ty: SqlDbType = serde_json::from_str("\"DateTime2\"").unwrap();
        assert_eq!(ty, SqlDbType::DateTime2);
    }
}
