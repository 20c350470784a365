use std::sync::Arc;

use indexmap::IndexMap;

use crate::column::MySqlColumn;
use crate::error::Error;
use crate::value::Value;

/// The shape rows are returned in by [`query_all`](crate::MySqlConnection::query_all).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowType {
    /// Column name to value, in column order. A later column wins over an earlier one of
    /// the same name.
    #[default]
    Map,

    /// Values in column order.
    Array,

    /// The value of the first column only.
    FirstColumn,
}

/// A row in the shape selected by a [`RowType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Map(IndexMap<String, Value>),
    Array(Vec<Value>),
    Value(Value),
}

/// A row of a result set.
#[derive(Debug, Clone)]
pub struct MySqlRow {
    columns: Arc<[MySqlColumn]>,
    values: Vec<Value>,
}

impl MySqlRow {
    pub(crate) fn new(columns: Arc<[MySqlColumn]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[MySqlColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Value, Error> {
        self.values
            .get(index)
            .ok_or(Error::ColumnIndexOutOfBounds {
                index,
                len: self.values.len(),
            })
    }

    /// The value of the first column named `name`.
    pub fn get_by_name(&self, name: &str) -> Result<&Value, Error> {
        self.columns
            .iter()
            .position(|column| column.name() == name)
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| Error::ColumnNotFound(name.to_owned()))
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn into_map(self) -> IndexMap<String, Value> {
        self.columns
            .iter()
            .map(|column| column.name().to_owned())
            .zip(self.values)
            .collect()
    }

    pub fn into_row(self, row_type: RowType) -> Row {
        match row_type {
            RowType::Map => Row::Map(self.into_map()),
            RowType::Array => Row::Array(self.into_values()),
            RowType::FirstColumn => {
                Row::Value(self.values.into_iter().next().unwrap_or(Value::Null))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::engine::mock::column_def;
    use crate::io::ProtocolDecode;
    use crate::protocol::{Capabilities, ColumnDefinition};
    use crate::type_id::ColumnType;

    fn column(ordinal: usize, name: &str) -> MySqlColumn {
        let def = ColumnDefinition::decode_with(
            Bytes::from(column_def(name, ColumnType::VarString)),
            Capabilities::PROTOCOL_41,
        )
        .unwrap();

        MySqlColumn::new(ordinal, def)
    }

    fn row() -> MySqlRow {
        let columns: Arc<[MySqlColumn]> =
            vec![column(0, "id"), column(1, "name"), column(2, "id")].into();

        MySqlRow::new(
            columns,
            vec![Value::Int(1), Value::String("ann".into()), Value::Int(2)],
        )
    }

    #[test]
    fn it_gets_values_by_index_and_name() {
        let row = row();

        assert_eq!(row.get(1).unwrap(), &Value::String("ann".into()));
        assert_eq!(row.get_by_name("id").unwrap(), &Value::Int(1));

        assert!(matches!(
            row.get(3),
            Err(Error::ColumnIndexOutOfBounds { index: 3, len: 3 })
        ));
        assert!(matches!(
            row.get_by_name("email"),
            Err(Error::ColumnNotFound(name)) if name == "email"
        ));
    }

    #[test]
    fn it_converts_into_each_row_type() {
        let Row::Map(map) = row().into_row(RowType::Map) else {
            panic!("expected a map");
        };

        // the later `id` wins, keeping the position of the first
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_index(0), Some((&"id".to_owned(), &Value::Int(2))));

        assert_eq!(
            row().into_row(RowType::Array),
            Row::Array(vec![Value::Int(1), Value::String("ann".into()), Value::Int(2)])
        );

        assert_eq!(row().into_row(RowType::FirstColumn), Row::Value(Value::Int(1)));
    }
}
