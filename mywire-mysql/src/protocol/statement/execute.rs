use bytes::BufMut;

use crate::error::Error;
use crate::io::{MySqlBufMutExt, ProtocolEncode};
use crate::protocol::Capabilities;
use crate::type_id::ColumnType;
use crate::value::{binary, Value};

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_execute.html

/// Flag in the second byte of a parameter type marking it unsigned.
const UNSIGNED_FLAG: u8 = 0x80;

/// One placeholder of a `COM_STMT_EXECUTE`.
#[derive(Debug)]
pub(crate) enum ExecuteParam<'a> {
    /// Encoded inline in the execute packet; NULL goes in the null bitmap.
    Inline(&'a Value),

    /// Already sent with `COM_STMT_SEND_LONG_DATA`.
    LongData(ColumnType),
}

impl ExecuteParam<'_> {
    fn type_pair(&self) -> (ColumnType, u8) {
        match self {
            ExecuteParam::Inline(value) => param_type(value),
            ExecuteParam::LongData(ty) => (*ty, 0),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, ExecuteParam::Inline(Value::Null))
    }
}

/// The wire type a value is bound as, with its flag byte.
pub(crate) fn param_type(value: &Value) -> (ColumnType, u8) {
    match value {
        Value::Null => (ColumnType::Null, 0),
        Value::Bool(_) => (ColumnType::Tiny, 0),
        Value::Int(v) if i32::try_from(*v).is_ok() => (ColumnType::Long, 0),
        Value::Int(_) => (ColumnType::LongLong, 0),
        Value::UInt(_) => (ColumnType::LongLong, UNSIGNED_FLAG),
        Value::Double(_) => (ColumnType::Double, 0),
        Value::Decimal(_) => (ColumnType::NewDecimal, 0),
        Value::Date(_) | Value::DateTime(_) => (ColumnType::Datetime, 0),
        Value::Bytes(_) => (ColumnType::LongBlob, 0),
        Value::String(_) | Value::Json(_) | Value::List(_) | Value::Object(_) => {
            (ColumnType::String, 0)
        }
    }
}

#[derive(Debug)]
pub(crate) struct Execute<'a> {
    pub(crate) statement: u32,
    pub(crate) params: &'a [ExecuteParam<'a>],
}

impl ProtocolEncode<'_, Capabilities> for Execute<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) -> Result<(), Error> {
        buf.push(0x17); // COM_STMT_EXECUTE
        buf.extend(&self.statement.to_le_bytes());
        buf.push(0); // NO_CURSOR
        buf.extend(&1_u32.to_le_bytes()); // iterations (always 1)

        if self.params.is_empty() {
            return Ok(());
        }

        // NULL-bitmap, bit `i % 8` of byte `i / 8` for parameter `i`
        let bitmap_offset = buf.len();
        buf.resize(bitmap_offset + (self.params.len() + 7) / 8, 0);

        for (i, param) in self.params.iter().enumerate() {
            if param.is_null() {
                buf[bitmap_offset + i / 8] |= 1 << (i % 8);
            }
        }

        // new-params-bound flag
        buf.push(1);

        for param in self.params {
            let (ty, flags) = param.type_pair();
            buf.push(ty as u8);
            buf.push(flags);
        }

        for param in self.params {
            if let ExecuteParam::Inline(value) = param {
                encode_value(buf, value)?;
            }
        }

        Ok(())
    }
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), Error> {
    match value {
        Value::Null => {}
        Value::Bool(v) => buf.put_u8(u8::from(*v)),

        Value::Int(v) => match i32::try_from(*v) {
            Ok(v) => buf.put_i32_le(v),
            Err(_) => buf.put_i64_le(*v),
        },

        Value::UInt(v) => buf.put_u64_le(*v),
        Value::Double(v) => buf.put_f64_le(*v),
        Value::Decimal(v) | Value::String(v) => buf.put_str_lenenc(v),
        Value::Bytes(v) => buf.put_bytes_lenenc(v),
        Value::Date(v) => binary::encode_date(buf, v),
        Value::DateTime(v) => binary::encode_datetime(buf, v),

        Value::Json(_) | Value::List(_) | Value::Object(_) => {
            let json = json_text(value)?;
            buf.put_str_lenenc(&json);
        }
    }

    Ok(())
}

/// Composite values bind as their JSON text.
pub(crate) fn json_text(value: &Value) -> Result<String, Error> {
    fn to_json(value: &Value) -> serde_json::Value {
        use serde_json::Value as Json;

        match value {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(*v),
            Value::Int(v) => Json::from(*v),
            Value::UInt(v) => Json::from(*v),
            Value::Double(v) => Json::from(*v),
            Value::Decimal(v) | Value::String(v) => Json::String(v.clone()),
            Value::Bytes(v) => Json::String(String::from_utf8_lossy(v).into_owned()),
            Value::Date(v) => Json::String(v.to_string()),
            Value::DateTime(v) => Json::String(v.to_string()),
            Value::Json(v) => v.clone(),
            Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
            Value::Object(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), to_json(v)))
                    .collect(),
            ),
        }
    }

    serde_json::to_string(&to_json(value)).map_err(|err| Error::Decode(err.into()))
}
