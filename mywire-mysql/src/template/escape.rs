//! Rendering of values and identifiers as SQL literals.

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::error::Error;
use crate::protocol::statement::json_text;
use crate::value::Value;

/// Append `value` as a SQL literal.
pub(crate) fn write_value(out: &mut String, value: &Value, no_backslash_escapes: bool) -> Result<(), Error> {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(true) => out.push_str("TRUE"),
        Value::Bool(false) => out.push_str("FALSE"),
        Value::Int(v) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::UInt(v) => out.push_str(itoa::Buffer::new().format(*v)),

        Value::Double(v) if v.is_finite() => {
            let _ = write!(out, "{v}");
        }

        // NaN and the infinities have no SQL spelling
        Value::Double(_) => out.push_str("NULL"),

        Value::Decimal(v) => {
            if v.is_empty()
                || !v
                    .bytes()
                    .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
            {
                return Err(err_template!("invalid decimal literal {:?}", v));
            }

            out.push_str(v);
        }

        Value::String(v) => write_string(out, v, no_backslash_escapes),

        Value::Bytes(v) => {
            out.push_str("x'");
            out.push_str(&hex::encode_upper(v));
            out.push('\'');
        }

        Value::Date(v) => {
            out.push('\'');
            write_date(out, v);
            out.push('\'');
        }

        Value::DateTime(v) => {
            out.push('\'');
            write_datetime(out, v);
            out.push('\'');
        }

        Value::Json(_) | Value::List(_) | Value::Object(_) => {
            write_string(out, &json_text(value)?, no_backslash_escapes);
        }
    }

    Ok(())
}

/// Append `s` as a single-quoted string literal.
///
/// With backslash escapes active every `'` and `\` is preceded by a `\`. Under
/// `NO_BACKSLASH_ESCAPES` backslashes are ordinary characters and `'` is doubled.
pub(crate) fn write_string(out: &mut String, s: &str, no_backslash_escapes: bool) {
    out.reserve(s.len() + 2);
    out.push('\'');

    for ch in s.chars() {
        match ch {
            '\'' if no_backslash_escapes => out.push_str("''"),
            '\'' | '\\' if !no_backslash_escapes => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }

    out.push('\'');
}

/// Append `name` as a backtick-quoted identifier.
pub(crate) fn write_ident(out: &mut String, name: &str) {
    out.reserve(name.len() + 2);
    out.push('`');

    for ch in name.chars() {
        if ch == '`' {
            out.push('`');
        }

        out.push(ch);
    }

    out.push('`');
}

fn write_date(out: &mut String, date: &NaiveDate) {
    let _ = write!(out, "{}", date.format("%Y-%m-%d"));
}

// trailing zero components are left out: midnight renders as a bare date and whole
// seconds have no fraction
fn write_datetime(out: &mut String, datetime: &NaiveDateTime) {
    write_date(out, &datetime.date());

    let time = datetime.time();
    let micros = time.nanosecond() / 1000;

    if time.num_seconds_from_midnight() == 0 && micros == 0 {
        return;
    }

    let _ = write!(out, " {}", time.format("%H:%M:%S"));

    if micros == 0 {
        return;
    }

    if micros % 1000 == 0 {
        let _ = write!(out, ".{:03}", micros / 1000);
    } else {
        let _ = write!(out, ".{micros:06}");
    }
}
