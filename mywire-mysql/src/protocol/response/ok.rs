use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};
use crate::protocol::response::SessionStateChange;
use crate::protocol::{Capabilities, Status};

/// Indicates successful completion of a previous command sent by the client.
///
/// Under `DEPRECATE_EOF` the same shape, with a `0xfe` header, also ends a row stream.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_ok_packet.html>
#[derive(Debug, Default)]
pub(crate) struct OkPacket {
    pub(crate) affected_rows: u64,
    pub(crate) last_insert_id: u64,
    pub(crate) status: Status,
    pub(crate) warnings: u16,
    pub(crate) info: String,
    pub(crate) session_state: Vec<SessionStateChange>,
}

impl ProtocolDecode<'_, Capabilities> for OkPacket {
    fn decode_with(mut buf: Bytes, capabilities: Capabilities) -> Result<Self, Error> {
        let header = buf.get_u8_checked()?;
        if header != 0 && header != 0xfe {
            return Err(err_protocol!(
                "expected 0x00 or 0xfe (OK_Packet) but found 0x{:02x}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc()?.unwrap_or(0);
        let last_insert_id = buf.get_uint_lenenc()?.unwrap_or(0);

        let (status, warnings) = if capabilities.contains(Capabilities::PROTOCOL_41) {
            let status = buf.get_u16_checked()?;
            let warnings = buf.get_u16_checked()?;

            (status, warnings)
        } else if capabilities.contains(Capabilities::TRANSACTIONS) {
            (buf.get_u16_checked()?, 0)
        } else {
            (0, 0)
        };

        let status = Status::from_bits_truncate(status);

        let mut info = String::new();
        let mut session_state = Vec::new();

        if capabilities.contains(Capabilities::SESSION_TRACK) {
            if buf.has_remaining() {
                info = String::from_utf8_lossy(&buf.get_bytes_lenenc()?).into_owned();
            }

            if status.contains(Status::SESSION_STATE_CHANGED) && buf.has_remaining() {
                session_state = SessionStateChange::parse_all(buf.get_bytes_lenenc()?)?;
            }
        } else {
            info = String::from_utf8_lossy(&buf).into_owned();
        }

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
            session_state,
        })
    }
}
