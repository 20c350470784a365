use bytes::Bytes;

use crate::error::Error;
use crate::io::{BufExt, MySqlBufExt, ProtocolDecode};

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_auth_switch_request.html

/// The server asks the client to authenticate again with a different plugin.
#[derive(Debug)]
pub(crate) struct AuthSwitchRequest {
    pub(crate) plugin_name: String,
    pub(crate) data: Bytes,
}

impl ProtocolDecode<'_> for AuthSwitchRequest {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        let header = buf.get_u8_checked()?;
        if header != 0xfe {
            return Err(err_protocol!(
                "expected 0xfe (AUTH_SWITCH) but found 0x{:02x}",
                header
            ));
        }

        if buf.is_empty() {
            // a bare 0xfe is the pre-4.1 "old password" switch
            return Ok(Self {
                plugin_name: "mysql_old_password".to_owned(),
                data: Bytes::new(),
            });
        }

        let plugin_name = buf.get_str_nul()?;
        let data = buf.get_bytes_eof();

        Ok(Self { plugin_name, data })
    }
}

#[test]
fn test_decode_auth_switch_packet_data() {
    const AUTH_SWITCH: &[u8] = b"\xfecaching_sha2_password\x00abcdefghijabcdefghij\x00";

    let p = AuthSwitchRequest::decode(AUTH_SWITCH.into()).unwrap();

    assert_eq!(p.plugin_name, "caching_sha2_password");
    assert_eq!(p.data, &b"abcdefghijabcdefghij"[..]);
}

#[test]
fn test_decode_auth_switch_old_password() {
    let p = AuthSwitchRequest::decode(Bytes::from_static(b"\xfe")).unwrap();

    assert_eq!(p.plugin_name, "mysql_old_password");
    assert!(p.data.is_empty());
}
