//! Conversions between sqltask values and tiberius column data

use std::borrow::Cow;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sqltask_core::{ColumnMeta, QueryResult, Row, SqlDbType, SqlParam, Value};
use tiberius::numeric::Numeric;
use tiberius::time::{Date, DateTime2, DateTimeOffset, SmallDateTime, Time};
use tiberius::{ColumnData, Row as TiberiusRow};
use uuid::Uuid;

use crate::connection::MssqlConnectionError;

type ConvertResult<T> = std::result::Result<T, MssqlConnectionError>;

/// `num_days_from_ce` of 1900-01-01, the epoch of `datetime` and `smalldatetime`
const LEGACY_EPOCH_DAYS: i32 = 693_596;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
/// `datetime` stores time of day in 1/300 second ticks
const LEGACY_TICKS_PER_SECOND: u64 = 300;
const LEGACY_TICKS_PER_DAY: u32 = 300 * 86_400;
const MINUTES_PER_DAY: u16 = 1_440;

fn conversion_error(what: impl std::fmt::Display) -> MssqlConnectionError {
    MssqlConnectionError::TypeConversion(what.to_string())
}

/// A statement parameter in the form tiberius sends it
#[derive(Debug, Clone)]
pub(crate) struct TiberiusParam(pub(crate) ColumnData<'static>);

impl tiberius::ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        self.0.clone()
    }
}

/// Convert bound parameters to tiberius parameters.
///
/// Parameters with an explicit type are coerced to it first; a null keeps its
/// type so the server sees a typed null.
pub(crate) fn params_to_tiberius(params: &[SqlParam]) -> ConvertResult<Vec<TiberiusParam>> {
    params
        .iter()
        .map(|param| {
            let value = match param.db_type {
                Some(db_type) => db_type
                    .coerce(param.value.clone())
                    .map_err(conversion_error)?,
                None => param.value.clone(),
            };
            value_to_column_data(value, param.db_type).map(TiberiusParam)
        })
        .collect()
}

/// Null column data of the kind matching `db_type`.
///
/// Untyped nulls go out as `nvarchar` which converts implicitly to most
/// column types.
pub(crate) fn typed_null(db_type: Option<SqlDbType>) -> ColumnData<'static> {
    let Some(db_type) = db_type else {
        return ColumnData::String(None);
    };
    match db_type {
        SqlDbType::Bit => ColumnData::Bit(None),
        SqlDbType::TinyInt => ColumnData::U8(None),
        SqlDbType::SmallInt => ColumnData::I16(None),
        SqlDbType::Int => ColumnData::I32(None),
        SqlDbType::BigInt => ColumnData::I64(None),
        SqlDbType::Real => ColumnData::F32(None),
        SqlDbType::Float | SqlDbType::Money => ColumnData::F64(None),
        SqlDbType::Decimal => ColumnData::Numeric(None),
        SqlDbType::Date => ColumnData::Date(None),
        SqlDbType::Time => ColumnData::Time(None),
        SqlDbType::DateTime => ColumnData::DateTime(None),
        SqlDbType::DateTime2 => ColumnData::DateTime2(None),
        SqlDbType::SmallDateTime => ColumnData::SmallDateTime(None),
        SqlDbType::DateTimeOffset => ColumnData::DateTimeOffset(None),
        SqlDbType::UniqueIdentifier => ColumnData::Guid(None),
        SqlDbType::Binary | SqlDbType::VarBinary => ColumnData::Binary(None),
        SqlDbType::Char
        | SqlDbType::VarChar
        | SqlDbType::NChar
        | SqlDbType::NVarChar
        | SqlDbType::Text
        | SqlDbType::NText
        | SqlDbType::Xml => ColumnData::String(None),
    }
}

/// Convert an owned value to owned column data
pub(crate) fn value_to_column_data(
    value: Value,
    db_type: Option<SqlDbType>,
) -> ConvertResult<ColumnData<'static>> {
    let data = match value {
        Value::Null => typed_null(db_type),
        Value::Bool(v) => ColumnData::Bit(Some(v)),
        Value::UInt8(v) => ColumnData::U8(Some(v)),
        Value::Int16(v) => ColumnData::I16(Some(v)),
        Value::Int32(v) => ColumnData::I32(Some(v)),
        Value::Int64(v) => ColumnData::I64(Some(v)),
        Value::Float32(v) => ColumnData::F32(Some(v)),
        Value::Float64(v) => ColumnData::F64(Some(v)),
        Value::Decimal(v) | Value::String(v) => ColumnData::String(Some(Cow::Owned(v))),
        Value::Bytes(v) => ColumnData::Binary(Some(Cow::Owned(v))),
        Value::Uuid(v) => ColumnData::Guid(Some(v)),
        Value::Date(v) => ColumnData::Date(Some(to_tds_date(v)?)),
        Value::Time(v) => ColumnData::Time(Some(to_tds_time(v))),
        Value::DateTime(v) => match db_type {
            Some(SqlDbType::DateTime) => ColumnData::DateTime(Some(to_legacy_datetime(v)?)),
            Some(SqlDbType::SmallDateTime) => {
                ColumnData::SmallDateTime(Some(to_small_datetime(v)?))
            }
            _ => ColumnData::DateTime2(Some(to_tds_datetime2(v)?)),
        },
        Value::DateTimeOffset(v) => ColumnData::DateTimeOffset(Some(to_tds_datetimeoffset(v)?)),
        Value::Json(v) => ColumnData::String(Some(Cow::Owned(v.to_string()))),
        array @ Value::Array(_) => ColumnData::String(Some(Cow::Owned(array.to_json().to_string()))),
        Value::Spatial(v) => ColumnData::Binary(Some(Cow::Owned(v.bytes))),
    };
    Ok(data)
}

/// Parse a decimal string into a numeric with the given scale.
///
/// Fraction digits beyond `scale` are truncated.
pub(crate) fn parse_numeric(text: &str, scale: u8) -> ConvertResult<Numeric> {
    let invalid = || conversion_error(format!("'{}' is not a valid decimal", text));
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let mut unscaled: String = int_part.to_string();
    unscaled.extend(frac_part.chars().take(scale as usize));
    for _ in frac_part.len()..scale as usize {
        unscaled.push('0');
    }
    let mut value: i128 = if unscaled.is_empty() {
        0
    } else {
        unscaled.parse().map_err(|_| invalid())?
    };
    if negative {
        value = -value;
    }
    Ok(Numeric::new_with_scale(value, scale))
}

pub(crate) fn to_tds_date(date: NaiveDate) -> ConvertResult<Date> {
    let days = u32::try_from(date.num_days_from_ce() - 1)
        .map_err(|_| conversion_error(format!("date {} is out of range", date)))?;
    Ok(Date::new(days))
}

fn nanos_from_midnight(time: NaiveTime) -> u64 {
    // Leap seconds carry an extra second in the nanosecond field.
    let nanos = u64::from(time.nanosecond()) % NANOS_PER_SECOND;
    u64::from(time.num_seconds_from_midnight()) * NANOS_PER_SECOND + nanos
}

/// Time of day at the maximum scale of 7 (100ns increments)
pub(crate) fn to_tds_time(time: NaiveTime) -> Time {
    Time::new(nanos_from_midnight(time) / 100, 7)
}

pub(crate) fn to_tds_datetime2(dt: NaiveDateTime) -> ConvertResult<DateTime2> {
    Ok(DateTime2::new(to_tds_date(dt.date())?, to_tds_time(dt.time())))
}

pub(crate) fn to_tds_datetimeoffset(dt: DateTime<FixedOffset>) -> ConvertResult<DateTimeOffset> {
    let offset = i16::try_from(dt.offset().local_minus_utc() / 60)
        .map_err(|_| conversion_error(format!("offset of {} is out of range", dt)))?;
    Ok(DateTimeOffset::new(to_tds_datetime2(dt.naive_utc())?, offset))
}

/// `datetime` value, rounded to the nearest 1/300 second
pub(crate) fn to_legacy_datetime(dt: NaiveDateTime) -> ConvertResult<tiberius::time::DateTime> {
    let mut days = dt.date().num_days_from_ce() - LEGACY_EPOCH_DAYS;
    let nanos = nanos_from_midnight(dt.time());
    let ticks = (nanos * LEGACY_TICKS_PER_SECOND + NANOS_PER_SECOND / 2) / NANOS_PER_SECOND;
    let mut ticks = u32::try_from(ticks).map_err(|_| conversion_error("time of day overflow"))?;
    if ticks >= LEGACY_TICKS_PER_DAY {
        days += 1;
        ticks -= LEGACY_TICKS_PER_DAY;
    }
    Ok(tiberius::time::DateTime::new(days, ticks))
}

/// `smalldatetime` value, rounded to the nearest minute
pub(crate) fn to_small_datetime(dt: NaiveDateTime) -> ConvertResult<SmallDateTime> {
    let out_of_range = || conversion_error(format!("{} is out of range for smalldatetime", dt));
    let mut days = dt.date().num_days_from_ce() - LEGACY_EPOCH_DAYS;
    let mut minutes = ((dt.time().num_seconds_from_midnight() + 30) / 60) as u16;
    if minutes >= MINUTES_PER_DAY {
        days += 1;
        minutes -= MINUTES_PER_DAY;
    }
    let days = u16::try_from(days).map_err(|_| out_of_range())?;
    Ok(SmallDateTime::new(days, minutes))
}

fn from_tds_date(date: Date) -> ConvertResult<NaiveDate> {
    i32::try_from(date.days())
        .ok()
        .and_then(|days| NaiveDate::from_num_days_from_ce_opt(days + 1))
        .ok_or_else(|| conversion_error("date out of range"))
}

fn from_tds_time(time: Time) -> ConvertResult<NaiveTime> {
    let scale = u32::from(time.scale().min(9));
    let nanos = time.increments() * 10u64.pow(9 - scale);
    let secs = u32::try_from(nanos / NANOS_PER_SECOND).map_err(|_| conversion_error("time out of range"))?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, (nanos % NANOS_PER_SECOND) as u32)
        .ok_or_else(|| conversion_error("time out of range"))
}

fn from_tds_datetime2(dt: DateTime2) -> ConvertResult<NaiveDateTime> {
    Ok(NaiveDateTime::new(
        from_tds_date(dt.date())?,
        from_tds_time(dt.time())?,
    ))
}

fn from_legacy_days(days: i64) -> ConvertResult<NaiveDate> {
    i32::try_from(days + i64::from(LEGACY_EPOCH_DAYS))
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| conversion_error("datetime out of range"))
}

/// Convert tiberius ColumnData to a sqltask Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> ConvertResult<Value> {
    let value = match col_data {
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::U8(v) => v.map(Value::UInt8),
        ColumnData::I16(v) => v.map(Value::Int16),
        ColumnData::I32(v) => v.map(Value::Int32),
        ColumnData::I64(v) => v.map(Value::Int64),
        ColumnData::F32(v) => v.map(Value::Float32),
        ColumnData::F64(v) => v.map(Value::Float64),
        ColumnData::String(v) => v.map(|s| Value::String(s.into_owned())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.map(|b| Value::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| Value::Decimal(n.to_string())),
        ColumnData::Xml(v) => v.map(|x| Value::String(x.into_owned().into_string())),
        ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None) => None,
        ColumnData::DateTime(Some(v)) => {
            let date = from_legacy_days(i64::from(v.days()))?;
            let nanos = u64::from(v.seconds_fragments()) * NANOS_PER_SECOND / LEGACY_TICKS_PER_SECOND;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (nanos / NANOS_PER_SECOND) as u32,
                (nanos % NANOS_PER_SECOND) as u32,
            )
            .ok_or_else(|| conversion_error("datetime out of range"))?;
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::SmallDateTime(Some(v)) => {
            let date = from_legacy_days(i64::from(v.days()))?;
            let time =
                NaiveTime::from_num_seconds_from_midnight_opt(u32::from(v.seconds_fragments()) * 60, 0)
                    .ok_or_else(|| conversion_error("smalldatetime out of range"))?;
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTime2(Some(v)) => Some(Value::DateTime(from_tds_datetime2(v)?)),
        ColumnData::DateTimeOffset(Some(v)) => {
            let utc = from_tds_datetime2(v.datetime2())?;
            let offset = FixedOffset::east_opt(i32::from(v.offset()) * 60)
                .ok_or_else(|| conversion_error("offset out of range"))?;
            Some(Value::DateTimeOffset(DateTime::from_naive_utc_and_offset(
                utc, offset,
            )))
        }
        ColumnData::Date(Some(v)) => Some(Value::Date(from_tds_date(v)?)),
        ColumnData::Time(Some(v)) => Some(Value::Time(from_tds_time(v)?)),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        ordinal,
    }
}

/// Convert one result set to a QueryResult.
///
/// Column metadata is taken from the first row, so an empty set has no columns.
pub(crate) fn rows_to_query_result(tib_rows: Vec<TiberiusRow>) -> ConvertResult<QueryResult> {
    let columns: Vec<ColumnMeta> = tib_rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                .collect()
        })
        .unwrap_or_default();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut rows = Vec::with_capacity(tib_rows.len());
    for tib_row in tib_rows {
        let values = tib_row
            .into_iter()
            .map(column_data_to_value)
            .collect::<ConvertResult<Vec<_>>>()?;
        rows.push(Row::new(column_names.clone(), values));
    }

    Ok(QueryResult {
        id: Uuid::new_v4(),
        columns,
        rows,
        execution_time_ms: 0,
    })
}
