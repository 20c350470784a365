use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode, ProtocolEncode};
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_prepare.html

#[derive(Debug)]
pub(crate) struct Prepare<'a> {
    pub(crate) query: &'a [u8],
}

impl ProtocolEncode<'_, Capabilities> for Prepare<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) -> Result<(), Error> {
        buf.push(0x16); // COM_STMT_PREPARE
        buf.extend_from_slice(self.query);
        Ok(())
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_prepare.html#sect_protocol_com_stmt_prepare_response_ok

#[derive(Debug)]
pub(crate) struct PrepareOk {
    pub(crate) statement_id: u32,
    pub(crate) columns: u16,
    pub(crate) params: u16,
    pub(crate) warnings: u16,
}

impl ProtocolDecode<'_, Capabilities> for PrepareOk {
    fn decode_with(mut buf: Bytes, _: Capabilities) -> Result<Self, Error> {
        const SIZE: usize = 12;

        if buf.len() < SIZE - 3 {
            return Err(err_protocol!(
                "PrepareOk expected at least 9 bytes but got {}",
                buf.len()
            ));
        }

        let status = buf.get_u8();
        if status != 0x00 {
            return Err(err_protocol!(
                "expected 0x00 (COM_STMT_PREPARE_OK) but found 0x{:02x}",
                status
            ));
        }

        let statement_id = buf.get_u32_le();
        let columns = buf.get_u16_le();
        let params = buf.get_u16_le();

        // reserved filler, then warnings on 4.1 servers
        let warnings = if buf.len() >= 3 {
            buf.advance(1);
            buf.get_u16_checked()?
        } else {
            0
        };

        Ok(Self {
            statement_id,
            columns,
            params,
            warnings,
        })
    }
}

#[test]
fn test_decode_prepare_ok() {
    const DATA: &[u8] = b"\x00\x01\x00\x00\x00\x02\x00\x03\x00\x00\x01\x00";

    let p = PrepareOk::decode_with(DATA.into(), Capabilities::PROTOCOL_41).unwrap();

    assert_eq!(p.statement_id, 1);
    assert_eq!(p.columns, 2);
    assert_eq!(p.params, 3);
    assert_eq!(p.warnings, 1);
}
