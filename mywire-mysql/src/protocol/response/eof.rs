use bytes::Bytes;

use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};
use crate::protocol::{Capabilities, Status};

/// Marks the end of a column list or row stream when `DEPRECATE_EOF` is not negotiated.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_eof_packet.html>
#[derive(Debug)]
pub(crate) struct EofPacket {
    pub(crate) warnings: u16,
    pub(crate) status: Status,
}

impl ProtocolDecode<'_, Capabilities> for EofPacket {
    fn decode_with(mut buf: Bytes, capabilities: Capabilities) -> Result<Self, Error> {
        let header = buf.get_u8_checked()?;
        if header != 0xfe {
            return Err(err_protocol!(
                "expected 0xfe (EOF) but found 0x{:02x}",
                header
            ));
        }

        if !capabilities.contains(Capabilities::PROTOCOL_41) || buf.len() < 4 {
            return Ok(Self {
                warnings: 0,
                status: Status::empty(),
            });
        }

        let warnings = buf.get_u16_checked()?;
        let status = Status::from_bits_truncate(buf.get_u16_checked()?);

        Ok(Self { warnings, status })
    }
}

#[test]
fn test_decode_eof_packet() {
    const DATA: &[u8] = b"\xfe\x01\x00\x0a\x00";

    let p = EofPacket::decode_with(DATA.into(), Capabilities::PROTOCOL_41).unwrap();

    assert_eq!(p.warnings, 1);
    assert!(p.status.contains(Status::MORE_RESULTS_EXISTS | Status::AUTOCOMMIT));
}
