use crate::error::Error;
use crate::io::ProtocolEncode;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_reset_connection.html

/// Resets the session without re-authenticating; added in MySQL 5.7.3.
#[derive(Debug)]
pub(crate) struct ResetConnection;

impl ProtocolEncode<'_, Capabilities> for ResetConnection {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) -> Result<(), Error> {
        buf.push(0x1f); // COM_RESET_CONNECTION
        Ok(())
    }
}
