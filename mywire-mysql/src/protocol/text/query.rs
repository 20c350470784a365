use crate::error::Error;
use crate::io::ProtocolEncode;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query.html

#[derive(Debug)]
pub(crate) struct Query<'q>(pub(crate) &'q [u8]);

impl ProtocolEncode<'_, Capabilities> for Query<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) -> Result<(), Error> {
        buf.push(0x03); // COM_QUERY
        buf.extend_from_slice(self.0);
        Ok(())
    }
}

#[test]
fn test_encode_query() {
    let mut buf = Vec::new();
    Query(b"SELECT 1")
        .encode_with(&mut buf, Capabilities::empty())
        .unwrap();

    assert_eq!(buf, b"\x03SELECT 1");
}
