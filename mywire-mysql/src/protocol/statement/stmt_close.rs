use crate::error::Error;
use crate::io::ProtocolEncode;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_close.html

/// Deallocates a prepared statement. The server sends no response.
#[derive(Debug)]
pub(crate) struct StmtClose {
    pub(crate) statement: u32,
}

impl ProtocolEncode<'_, Capabilities> for StmtClose {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) -> Result<(), Error> {
        buf.push(0x19); // COM_STMT_CLOSE
        buf.extend(&self.statement.to_le_bytes());
        Ok(())
    }
}
