//! Dynamically typed values read from rows and bound to statements.

use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use tokio::io::AsyncRead;

pub(crate) mod binary;
pub(crate) mod text;

/// A value read from a result row, or bound to a statement or template.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),

    /// An unsigned `BIGINT` too large for [`Value::Int`].
    UInt(u64),

    Double(f64),

    /// Exact decimal text, as the server formats `DECIMAL` columns.
    Decimal(String),

    String(String),
    Bytes(Bytes),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(serde_json::Value),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            Value::Int(v) => Some(v != 0),
            Value::UInt(v) => Some(v != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) => i64::try_from(v).ok(),
            Value::Bool(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(v) => Some(v),
            Value::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Decimal(v) => v.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) | Value::Decimal(v) => Some(v),
            Value::Bytes(v) => std::str::from_utf8(v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            Value::String(v) | Value::Decimal(v) => Some(v.as_bytes()),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    u64 => UInt,
    f32 => Double,
    f64 => Double,
    String => String,
    &'_ str => String,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    serde_json::Value => Json,
    Vec<Value> => List,
    IndexMap<String, Value> => Object,
}

impl From<&'_ [u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A statement parameter: a value, or a byte stream sent to the server as long data.
pub enum Param {
    Value(Value),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Param {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Param::Stream(Box::new(reader))
    }
}

impl Debug for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Param::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Param::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl<T> From<T> for Param
where
    T: Into<Value>,
{
    fn from(v: T) -> Self {
        Param::Value(v.into())
    }
}

/// Build a `Vec<Param>` from a list of expressions convertible into [`Value`].
///
/// ```rust,ignore
/// let params = params![42, "hello", None::<i32>];
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Param>::new()
    };

    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Param::from($value)),+]
    };
}
