//! Structured temporal fields of binary protocol rows and bound parameters.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_binary_resultset.html>

use bytes::{Buf, BufMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::Error;
use crate::value::Value;

/// Decode a `DATE`, `DATETIME` or `TIMESTAMP` from its length-prefixed binary form
/// (the length byte already consumed).
pub(crate) fn decode_datetime(mut buf: &[u8], date_only: bool) -> Result<Value, Error> {
    if buf.is_empty() {
        // all zero; the server's zero date
        return Ok(Value::Null);
    }

    if buf.len() < 4 {
        return Err(err_protocol!("binary date of {} bytes", buf.len()));
    }

    let year = i32::from(buf.get_u16_le());
    let month = u32::from(buf.get_u8());
    let day = u32::from(buf.get_u8());

    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        // zero or partial dates such as 2020-00-00
        return Ok(Value::Null);
    };

    if date_only {
        return Ok(Value::Date(date));
    }

    let (hour, minute, second) = if buf.len() >= 3 {
        (u32::from(buf.get_u8()), u32::from(buf.get_u8()), u32::from(buf.get_u8()))
    } else {
        (0, 0, 0)
    };

    let micros = if buf.len() >= 4 { buf.get_u32_le() } else { 0 };

    date.and_hms_micro_opt(hour, minute, second, micros)
        .map(Value::DateTime)
        .ok_or_else(|| err_protocol!("binary datetime out of range"))
}

/// Decode a `TIME` as signed seconds with fraction.
pub(crate) fn decode_time(mut buf: &[u8]) -> Result<Value, Error> {
    if buf.is_empty() {
        return Ok(Value::Double(0.0));
    }

    if buf.len() < 8 {
        return Err(err_protocol!("binary time of {} bytes", buf.len()));
    }

    let negative = buf.get_u8() == 1;
    let days = f64::from(buf.get_u32_le());
    let hours = f64::from(buf.get_u8());
    let minutes = f64::from(buf.get_u8());
    let seconds = f64::from(buf.get_u8());
    let micros = if buf.len() >= 4 { f64::from(buf.get_u32_le()) } else { 0.0 };

    let total = days * 86_400.0 + hours * 3600.0 + minutes * 60.0 + seconds + micros / 1e6;

    Ok(Value::Double(if negative { -total } else { total }))
}

/// Encode a date as a length-prefixed `DATETIME` parameter.
pub(crate) fn encode_date(buf: &mut Vec<u8>, date: &NaiveDate) {
    buf.put_u8(4);
    encode_ymd(buf, date);
}

/// Encode a datetime as a length-prefixed `DATETIME` parameter, eliding zero components.
pub(crate) fn encode_datetime(buf: &mut Vec<u8>, datetime: &NaiveDateTime) {
    let time = datetime.time();
    let micros = time.nanosecond() / 1000;

    let len: u8 = match (time.hour(), time.minute(), time.second(), micros) {
        (0, 0, 0, 0) => 4,
        (_, _, _, 0) => 7,
        _ => 11,
    };

    buf.put_u8(len);
    encode_ymd(buf, &datetime.date());

    if len > 4 {
        // ALLOW: hour, minute and second are all below 60
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&[time.hour() as u8, time.minute() as u8, time.second() as u8]);
    }

    if len > 7 {
        buf.put_u32_le(micros);
    }
}

fn encode_ymd(buf: &mut Vec<u8>, date: &NaiveDate) {
    // years outside 0..=9999 are rejected by the server either way
    let year = u16::try_from(date.year()).unwrap_or(0);

    buf.put_u16_le(year);

    // ALLOW: month and day are at most 31
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&[date.month() as u8, date.day() as u8]);
}
