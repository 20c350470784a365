use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};
use crate::protocol::Capabilities;
use crate::type_id::{ColumnFlags, ColumnType};

/// Describes a column in a result set or a parameter of a prepared statement.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_text_resultset_column_definition.html>
/// <https://mariadb.com/kb/en/result-set-packets/#column-definition-packet>
#[derive(Debug, Clone)]
pub(crate) struct ColumnDefinition {
    pub(crate) catalog: String,
    pub(crate) schema: String,
    pub(crate) table: String,
    pub(crate) org_table: String,
    pub(crate) name: String,
    pub(crate) org_name: String,
    pub(crate) charset: u16,
    pub(crate) max_size: u32,
    pub(crate) r#type: ColumnType,
    pub(crate) flags: ColumnFlags,
    pub(crate) decimals: u8,
}

impl ProtocolDecode<'_, Capabilities> for ColumnDefinition {
    fn decode_with(buf: Bytes, capabilities: Capabilities) -> Result<Self, Error> {
        if capabilities.contains(Capabilities::PROTOCOL_41) {
            decode_41(buf)
        } else {
            decode_320(buf)
        }
    }
}

fn decode_41(mut buf: Bytes) -> Result<ColumnDefinition, Error> {
    let catalog = buf.get_str_lenenc()?;
    let schema = buf.get_str_lenenc()?;
    let table = buf.get_str_lenenc()?;
    let org_table = buf.get_str_lenenc()?;
    let name = buf.get_str_lenenc()?;
    let org_name = buf.get_str_lenenc()?;

    // length of the fixed-length block that follows; always 0x0c
    let fixed_len = buf.get_uint_lenenc()?.unwrap_or(0);
    if fixed_len < 0x0c || buf.remaining() < 0x0c {
        return Err(err_protocol!(
            "column definition for {:?} has a truncated fixed block",
            name
        ));
    }

    let charset = buf.get_u16_le();
    let max_size = buf.get_u32_le();
    let r#type = ColumnType::try_from_u8(buf.get_u8())?;
    let flags = ColumnFlags::from_bits_truncate(buf.get_u16_le());
    let decimals = buf.get_u8();

    Ok(ColumnDefinition {
        catalog,
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        max_size,
        r#type,
        flags,
        decimals,
    })
}

// Pre-4.1 servers send a reduced shape where every fixed-width field is itself
// wrapped in a length-encoded string.
fn decode_320(mut buf: Bytes) -> Result<ColumnDefinition, Error> {
    let table = buf.get_str_lenenc()?;
    let name = buf.get_str_lenenc()?;

    let mut length = buf.get_bytes_lenenc()?;
    let max_size = match length.len() {
        0 => 0,
        n => u32::try_from(length.get_uint_le(n.min(4)))
            .map_err(|_| err_protocol!("column length out of range"))?,
    };

    let mut ty = buf.get_bytes_lenenc()?;
    let r#type = ColumnType::try_from_u8(ty.get_u8_checked()?)?;

    // two bytes of flags with LONG_FLAG, one without; decimals follow either way
    let mut block = buf.get_bytes_lenenc()?;
    let (flags, decimals) = if block.len() >= 3 {
        (block.get_u16_le(), block.get_u8())
    } else if block.len() == 2 {
        (u16::from(block.get_u8()), block.get_u8())
    } else {
        return Err(err_protocol!("column definition for {:?} has no flags", name));
    };

    Ok(ColumnDefinition {
        catalog: String::new(),
        schema: String::new(),
        org_table: table.clone(),
        table,
        org_name: name.clone(),
        name,
        // pre-4.1 servers have no per-column charset; text is assumed
        charset: 0,
        max_size,
        r#type,
        flags: ColumnFlags::from_bits_truncate(flags),
        decimals,
    })
}
