use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::MySqlBufExt;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_ok_packet.html
// Each block is a type byte followed by a length-encoded payload.
const SESSION_TRACK_SYSTEM_VARIABLES: u8 = 0x00;
const SESSION_TRACK_SCHEMA: u8 = 0x01;

/// One entry of the session state change list carried by an OK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionStateChange {
    SystemVariable { name: String, value: String },
    Schema(String),
    /// A tracker this client does not interpret (state change, GTIDs, transaction state).
    Other(u8),
}

impl SessionStateChange {
    /// Parse every block of a session state change list.
    pub(crate) fn parse_all(mut buf: Bytes) -> Result<Vec<Self>, Error> {
        let mut changes = Vec::new();

        while buf.has_remaining() {
            let kind = buf.get_u8_checked()?;
            let mut data = buf.get_bytes_lenenc()?;

            changes.push(match kind {
                SESSION_TRACK_SYSTEM_VARIABLES => {
                    let name = data.get_str_lenenc()?;
                    let value = data.get_str_lenenc()?;

                    SessionStateChange::SystemVariable { name, value }
                }

                SESSION_TRACK_SCHEMA => SessionStateChange::Schema(data.get_str_lenenc()?),

                other => SessionStateChange::Other(other),
            });
        }

        Ok(changes)
    }
}
