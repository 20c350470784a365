use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{BufExt, MySqlBufExt, ProtocolDecode};

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_err_packet.html
// https://mariadb.com/kb/en/err_packet/

#[derive(Debug, Clone)]
pub(crate) struct ErrPacket {
    pub(crate) error_code: u16,
    pub(crate) sql_state: Option<String>,
    pub(crate) error_message: String,
}

impl ErrPacket {
    /// A client-side error, numbered the way libmysqlclient numbers them (2000..).
    pub(crate) fn client(error_code: u16, message: impl Into<String>) -> Self {
        Self {
            error_code,
            sql_state: Some("HY000".into()),
            error_message: message.into(),
        }
    }
}

impl ProtocolDecode<'_> for ErrPacket {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        let header = buf.get_u8_checked()?;
        if header != 0xff {
            return Err(err_protocol!(
                "expected 0xff (ERR) but found 0x{:02x}",
                header
            ));
        }

        let error_code = buf.get_u16_checked()?;

        // the 4.1 protocol prefixes the message with `#` and a five character state
        let sql_state = if buf.first() == Some(&b'#') && buf.len() >= 6 {
            buf.advance(1);

            Some(buf.get_str(5)?)
        } else {
            None
        };

        let error_message = String::from_utf8_lossy(&buf).into_owned();

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

#[test]
fn test_decode_err_packet_out_of_order() {
    const ERR_PACKETS_OUT_OF_ORDER: &[u8] = b"\xff\x84\x04Got packets out of order";

    let p = ErrPacket::decode(ERR_PACKETS_OUT_OF_ORDER.into()).unwrap();

    assert_eq!(&p.error_message, "Got packets out of order");
    assert_eq!(p.error_code, 1156);
    assert_eq!(p.sql_state, None);
}

#[test]
fn test_decode_err_packet_unknown_database() {
    const ERR_HANDSHAKE_UNKNOWN_DB: &[u8] = b"\xff\x19\x04#42000Unknown database \'unknown\'";

    let p = ErrPacket::decode(ERR_HANDSHAKE_UNKNOWN_DB.into()).unwrap();

    assert_eq!(p.error_code, 1049);
    assert_eq!(p.sql_state.as_deref(), Some("42000"));
    assert_eq!(&p.error_message, "Unknown database \'unknown\'");
}

#[test]
fn test_decode_err_packet_rejects_other_headers() {
    assert!(ErrPacket::decode(Bytes::from_static(b"\x00\x00\x00")).is_err());
}
