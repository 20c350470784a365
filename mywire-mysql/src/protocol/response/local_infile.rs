use bytes::Bytes;

use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};

/// The server asks for the contents of a local file, following `LOAD DATA LOCAL INFILE`.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_local_infile_request.html>
#[derive(Debug)]
pub(crate) struct LocalInfilePacket {
    pub(crate) filename: String,
}

impl ProtocolDecode<'_> for LocalInfilePacket {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        let header = buf.get_u8_checked()?;
        if header != 0xfb {
            return Err(err_protocol!(
                "expected 0xfb (LOCAL INFILE request) but found 0x{:02x}",
                header
            ));
        }

        let filename = String::from_utf8_lossy(&buf).into_owned();

        Ok(Self { filename })
    }
}

#[test]
fn test_decode_local_infile_packet() {
    const DATA: &[u8] = b"\xfb\x64\x75\x6d\x6d\x79.csv";

    let p = LocalInfilePacket::decode(DATA.into()).unwrap();

    assert_eq!(p.filename, "dummy.csv");
}
