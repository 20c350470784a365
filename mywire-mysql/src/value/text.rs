//! Conversion of text protocol fields into [`Value`]s.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};

use crate::column::MySqlColumn;
use crate::error::{BoxDynError, Error};
use crate::type_id::ColumnType;
use crate::value::Value;

/// Decode one non-NULL text protocol field according to its column type.
pub(crate) fn decode(column: &MySqlColumn, raw: Bytes) -> Result<Value, Error> {
    decode_text(column.column_type(), column.is_unsigned(), column.is_binary(), raw)
        .map_err(|err| {
            Error::Decode(
                format!(
                    "column {:?} ({}): {}",
                    column.name(),
                    column.column_type().name(),
                    err
                )
                .into(),
            )
        })
}

pub(crate) fn decode_text(
    ty: ColumnType,
    unsigned: bool,
    binary: bool,
    raw: Bytes,
) -> Result<Value, BoxDynError> {
    Ok(match ty {
        ColumnType::Null => Value::Null,

        ColumnType::Tiny
        | ColumnType::Short
        | ColumnType::Int24
        | ColumnType::Long
        | ColumnType::LongLong
        | ColumnType::Year => decode_int(&raw, unsigned)?,

        ColumnType::Decimal | ColumnType::NewDecimal => Value::Decimal(utf8(raw)?),

        ColumnType::Float | ColumnType::Double => Value::Double(utf8(raw)?.parse()?),

        ColumnType::Date => {
            let s = utf8(raw)?;
            if is_zero_date(&s) {
                Value::Null
            } else {
                Value::Date(NaiveDate::parse_from_str(&s, "%Y-%m-%d")?)
            }
        }

        ColumnType::Datetime | ColumnType::Timestamp => {
            let s = utf8(raw)?;
            if is_zero_date(&s) {
                Value::Null
            } else {
                Value::DateTime(NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")?)
            }
        }

        ColumnType::Time => Value::Double(parse_time(&utf8(raw)?)?),

        ColumnType::Bit => Value::Bytes(raw),

        ColumnType::Json => Value::Json(serde_json::from_slice(&raw)?),

        ColumnType::VarChar
        | ColumnType::Enum
        | ColumnType::Set
        | ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::VarString
        | ColumnType::String
        | ColumnType::Geometry => {
            if binary {
                Value::Bytes(raw)
            } else {
                match std::str::from_utf8(&raw) {
                    Ok(s) => Value::String(s.to_owned()),
                    Err(_) => Value::Bytes(raw),
                }
            }
        }
    })
}

fn decode_int(raw: &[u8], unsigned: bool) -> Result<Value, BoxDynError> {
    if let Some(v) = atoi::atoi::<i64>(raw) {
        return Ok(Value::Int(v));
    }

    if unsigned {
        if let Some(v) = atoi::atoi::<u64>(raw) {
            return Ok(Value::UInt(v));
        }
    }

    Err(format!("invalid integer {:?}", String::from_utf8_lossy(raw)).into())
}

fn utf8(raw: Bytes) -> Result<String, BoxDynError> {
    Ok(String::from_utf8(raw.to_vec())?)
}

fn is_zero_date(s: &str) -> bool {
    s.starts_with("0000-00-00")
}

/// `[-]HHH:MM:SS[.ffffff]` as signed seconds.
pub(crate) fn parse_time(s: &str) -> Result<f64, BoxDynError> {
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let mut parts = s.splitn(3, ':');

    let (Some(hours), Some(minutes), Some(seconds)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("invalid time {s:?}").into());
    };

    let hours: u32 = hours.parse()?;
    let minutes: u32 = minutes.parse()?;
    let seconds: f64 = seconds.parse()?;

    let total = f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds;

    Ok(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(ty: ColumnType, raw: &'static [u8]) -> Value {
        decode_text(ty, false, false, Bytes::from_static(raw)).unwrap()
    }

    #[test]
    fn it_decodes_integers() {
        assert_eq!(text(ColumnType::Long, b"-42"), Value::Int(-42));
        assert_eq!(text(ColumnType::Year, b"2024"), Value::Int(2024));

        let big = decode_text(
            ColumnType::LongLong,
            true,
            false,
            Bytes::from_static(b"18446744073709551615"),
        )
        .unwrap();
        assert_eq!(big, Value::UInt(u64::MAX));

        assert!(decode_text(ColumnType::Long, false, false, Bytes::from_static(b"x")).is_err());
    }

    #[test]
    fn it_decodes_decimals_and_floats() {
        assert_eq!(
            text(ColumnType::NewDecimal, b"12345678901234567890.01"),
            Value::Decimal("12345678901234567890.01".into())
        );
        assert_eq!(text(ColumnType::Double, b"1.5"), Value::Double(1.5));
    }

    #[test]
    fn it_decodes_dates() {
        assert_eq!(
            text(ColumnType::Date, b"2020-03-04"),
            Value::Date(NaiveDate::from_ymd_opt(2020, 3, 4).unwrap())
        );

        let dt = NaiveDate::from_ymd_opt(2020, 3, 4)
            .unwrap()
            .and_hms_micro_opt(5, 6, 7, 123_000)
            .unwrap();
        assert_eq!(
            text(ColumnType::Datetime, b"2020-03-04 05:06:07.123"),
            Value::DateTime(dt)
        );

        assert_eq!(text(ColumnType::Date, b"0000-00-00"), Value::Null);
        assert_eq!(text(ColumnType::Timestamp, b"0000-00-00 00:00:00"), Value::Null);
    }

    #[test]
    fn it_decodes_time_as_seconds() {
        assert_eq!(text(ColumnType::Time, b"01:02:03"), Value::Double(3723.0));
        assert_eq!(text(ColumnType::Time, b"-838:59:59.5"), Value::Double(-3_020_399.5));
    }

    #[test]
    fn it_decodes_strings_and_bytes() {
        assert_eq!(text(ColumnType::VarString, b"hello"), Value::String("hello".into()));
        assert_eq!(
            decode_text(ColumnType::Blob, false, true, Bytes::from_static(b"\xff\x00")).unwrap(),
            Value::Bytes(Bytes::from_static(b"\xff\x00"))
        );
        assert_eq!(
            text(ColumnType::VarString, b"\xff"),
            Value::Bytes(Bytes::from_static(b"\xff"))
        );
    }

    #[test]
    fn it_decodes_json() {
        assert_eq!(
            text(ColumnType::Json, br#"{"a":[1,2]}"#),
            Value::Json(serde_json::json!({"a": [1, 2]}))
        );
    }
}
