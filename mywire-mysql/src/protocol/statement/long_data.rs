use crate::error::Error;
use crate::io::ProtocolEncode;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_send_long_data.html

/// Appends a chunk to a parameter ahead of `COM_STMT_EXECUTE`. The server sends no response.
#[derive(Debug)]
pub(crate) struct SendLongData<'a> {
    pub(crate) statement: u32,
    pub(crate) param: u16,
    pub(crate) data: &'a [u8],
}

/// Bytes preceding the data in a `COM_STMT_SEND_LONG_DATA` payload.
pub(crate) const SEND_LONG_DATA_HEADER_LEN: usize = 7;

impl ProtocolEncode<'_, Capabilities> for SendLongData<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) -> Result<(), Error> {
        buf.push(0x18); // COM_STMT_SEND_LONG_DATA
        buf.extend(&self.statement.to_le_bytes());
        buf.extend(&self.param.to_le_bytes());
        buf.extend_from_slice(self.data);
        Ok(())
    }
}

#[test]
fn test_encode_send_long_data() {
    let mut buf = Vec::new();

    SendLongData {
        statement: 7,
        param: 1,
        data: b"abc",
    }
    .encode_with(&mut buf, Capabilities::empty())
    .unwrap();

    assert_eq!(buf.len(), SEND_LONG_DATA_HEADER_LEN + 3);
    assert_eq!(buf, b"\x18\x07\x00\x00\x00\x01\x00abc");
}
