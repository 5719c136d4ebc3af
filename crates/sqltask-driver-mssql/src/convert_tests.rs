//! Tests for value conversion

use crate::convert::*;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use sqltask_core::{SqlDbType, SqlParam, Value};
use std::borrow::Cow;
use tiberius::ColumnData;

fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

mod param_tests {
    use super::*;

    #[test]
    fn test_params_keep_order() {
        let params = params_to_tiberius(&[
            SqlParam::positional(Value::Int32(42)),
            SqlParam::positional(Value::String("test".into())),
            SqlParam::positional(Value::Bool(true)),
        ])
        .unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].0, ColumnData::I32(Some(42)));
        assert_eq!(params[1].0, ColumnData::String(Some(Cow::Borrowed("test"))));
        assert_eq!(params[2].0, ColumnData::Bit(Some(true)));
    }

    #[test]
    fn test_explicit_type_coerces_value() {
        let params = params_to_tiberius(&[SqlParam::named(
            "@Id",
            Value::String("42".into()),
            Some(SqlDbType::Int),
        )])
        .unwrap();
        assert_eq!(params[0].0, ColumnData::I32(Some(42)));
    }

    #[test]
    fn test_explicit_type_rejects_unconvertible_value() {
        let err = params_to_tiberius(&[SqlParam::named(
            "@Id",
            Value::String("forty-two".into()),
            Some(SqlDbType::Int),
        )])
        .unwrap_err();
        assert!(err.to_string().contains("int"));
    }

    #[test]
    fn test_typed_null() {
        let params = params_to_tiberius(&[
            SqlParam::named("@When", Value::Null, Some(SqlDbType::DateTime2)),
            SqlParam::named("@Amount", Value::Null, Some(SqlDbType::Decimal)),
            SqlParam::named("@Note", Value::Null, None),
        ])
        .unwrap();
        assert_eq!(params[0].0, ColumnData::DateTime2(None));
        assert_eq!(params[1].0, ColumnData::Numeric(None));
        assert_eq!(params[2].0, ColumnData::String(None));
    }

    #[test]
    fn test_json_and_array_are_sent_as_text() {
        let params = params_to_tiberius(&[
            SqlParam::positional(Value::Json(serde_json::json!({"key": "value"}))),
            SqlParam::positional(Value::Array(vec![Value::Int64(1), Value::Int64(2)])),
        ])
        .unwrap();
        assert_eq!(
            params[0].0,
            ColumnData::String(Some(Cow::Borrowed(r#"{"key":"value"}"#)))
        );
        assert_eq!(params[1].0, ColumnData::String(Some(Cow::Borrowed("[1,2]"))));
    }

    #[test]
    fn test_datetime_uses_legacy_type_when_asked() {
        let value = Value::DateTime(datetime(2024, 1, 15, 14, 30, 0));
        let legacy = value_to_column_data(value.clone(), Some(SqlDbType::DateTime)).unwrap();
        assert!(matches!(legacy, ColumnData::DateTime(Some(_))));
        let modern = value_to_column_data(value, None).unwrap();
        assert!(matches!(modern, ColumnData::DateTime2(Some(_))));
    }
}

mod temporal_tests {
    use super::*;

    #[test]
    fn test_date_epoch() {
        let date = to_tds_date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap()).unwrap();
        assert_eq!(date.days(), 0);
    }

    #[test]
    fn test_legacy_datetime_epoch() {
        let dt = to_legacy_datetime(datetime(1900, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(dt.days(), 0);
        assert_eq!(dt.seconds_fragments(), 0);
    }

    #[test]
    fn test_legacy_datetime_ticks() {
        let dt = to_legacy_datetime(datetime(1900, 1, 2, 0, 0, 1)).unwrap();
        assert_eq!(dt.days(), 1);
        assert_eq!(dt.seconds_fragments(), 300);
    }

    #[test]
    fn test_legacy_datetime_rounds_into_next_day() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_nano_opt(23, 59, 59, 999_000_000)
            .unwrap();
        let legacy = to_legacy_datetime(dt).unwrap();
        let next_day = to_legacy_datetime(datetime(2024, 1, 16, 0, 0, 0)).unwrap();
        assert_eq!(legacy.days(), next_day.days());
        assert_eq!(legacy.seconds_fragments(), 0);
    }

    #[test]
    fn test_small_datetime_rounds_to_minute() {
        let dt = to_small_datetime(datetime(1900, 1, 1, 0, 1, 40)).unwrap();
        assert_eq!(dt.days(), 0);
        assert_eq!(dt.seconds_fragments(), 2);
    }

    #[test]
    fn test_small_datetime_rejects_dates_before_1900() {
        assert!(to_small_datetime(datetime(1899, 12, 31, 0, 0, 0)).is_err());
    }

    #[test]
    fn test_datetime2_read_back() {
        let original = NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_micro_opt(8, 15, 30, 123_456)
            .unwrap();
        let data = ColumnData::DateTime2(Some(to_tds_datetime2(original).unwrap()));
        assert_eq!(column_data_to_value(data).unwrap(), Value::DateTime(original));
    }

    #[test]
    fn test_datetimeoffset_keeps_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let original = offset.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let data = ColumnData::DateTimeOffset(Some(to_tds_datetimeoffset(original).unwrap()));
        match column_data_to_value(data).unwrap() {
            Value::DateTimeOffset(read) => {
                assert_eq!(read, original);
                assert_eq!(read.offset().local_minus_utc(), 7200);
            }
            other => panic!("expected a datetimeoffset, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_datetime_read_back() {
        let data = ColumnData::DateTime(Some(tiberius::time::DateTime::new(1, 300 * 3600)));
        assert_eq!(
            column_data_to_value(data).unwrap(),
            Value::DateTime(datetime(1900, 1, 2, 1, 0, 0))
        );
    }

    #[test]
    fn test_time_scale_is_respected() {
        // 1.5 seconds at scale 3
        let data = ColumnData::Time(Some(tiberius::time::Time::new(1_500, 3)));
        assert_eq!(
            column_data_to_value(data).unwrap(),
            Value::Time(NaiveTime::from_hms_milli_opt(0, 0, 1, 500).unwrap())
        );
    }
}

mod numeric_tests {
    use super::*;

    #[test]
    fn test_parse_numeric_pads_scale() {
        let n = parse_numeric("12.5", 2).unwrap();
        assert_eq!(n.value(), 1250);
        assert_eq!(n.scale(), 2);
    }

    #[test]
    fn test_parse_numeric_truncates_extra_digits() {
        let n = parse_numeric("-3.14159", 2).unwrap();
        assert_eq!(n.value(), -314);
    }

    #[test]
    fn test_parse_numeric_integer() {
        let n = parse_numeric("+7", 0).unwrap();
        assert_eq!(n.value(), 7);
    }

    #[test]
    fn test_parse_numeric_rejects_garbage() {
        assert!(parse_numeric("1e5", 2).is_err());
        assert!(parse_numeric("", 2).is_err());
        assert!(parse_numeric("12.3.4", 2).is_err());
    }
}

mod column_data_tests {
    use super::*;

    #[test]
    fn test_nulls_become_null() {
        assert_eq!(column_data_to_value(ColumnData::I32(None)).unwrap(), Value::Null);
        assert_eq!(column_data_to_value(ColumnData::DateTime2(None)).unwrap(), Value::Null);
        assert_eq!(column_data_to_value(ColumnData::Numeric(None)).unwrap(), Value::Null);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(column_data_to_value(ColumnData::I32(Some(42))).unwrap(), Value::Int32(42));
        assert_eq!(column_data_to_value(ColumnData::U8(Some(7))).unwrap(), Value::UInt8(7));
        assert_eq!(column_data_to_value(ColumnData::Bit(Some(true))).unwrap(), Value::Bool(true));
        assert_eq!(
            column_data_to_value(ColumnData::String(Some(Cow::Owned("hello".to_string())))).unwrap(),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn test_numeric_becomes_decimal_text() {
        let n = tiberius::numeric::Numeric::new_with_scale(12345, 2);
        assert_eq!(
            column_data_to_value(ColumnData::Numeric(Some(n))).unwrap(),
            Value::Decimal("123.45".to_string())
        );
    }
}
