use crate::protocol::ColumnDefinition;
use crate::type_id::{ColumnFlags, ColumnType};

/// Binary collation: the column holds bytes rather than text.
pub(crate) const BINARY_CHARSET: u16 = 63;

/// A result set column or prepared statement parameter.
#[derive(Debug, Clone)]
pub struct MySqlColumn {
    pub(crate) ordinal: usize,
    pub(crate) def: ColumnDefinition,
}

impl MySqlColumn {
    pub(crate) fn new(ordinal: usize, def: ColumnDefinition) -> Self {
        Self { ordinal, def }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The column name or alias.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn org_name(&self) -> &str {
        &self.def.org_name
    }

    /// The table name or alias.
    pub fn table(&self) -> &str {
        &self.def.table
    }

    pub fn org_table(&self) -> &str {
        &self.def.org_table
    }

    pub fn schema(&self) -> &str {
        &self.def.schema
    }

    pub fn catalog(&self) -> &str {
        &self.def.catalog
    }

    pub fn charset(&self) -> u16 {
        self.def.charset
    }

    /// Maximum length of the column, in bytes.
    pub fn max_size(&self) -> u32 {
        self.def.max_size
    }

    pub fn column_type(&self) -> ColumnType {
        self.def.r#type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.def.flags
    }

    pub fn decimals(&self) -> u8 {
        self.def.decimals
    }

    pub fn is_unsigned(&self) -> bool {
        self.def.flags.contains(ColumnFlags::UNSIGNED)
    }

    pub(crate) fn is_binary(&self) -> bool {
        self.def.charset == BINARY_CHARSET
    }
}
