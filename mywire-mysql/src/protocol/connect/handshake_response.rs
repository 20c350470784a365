use bytes::BufMut;

use crate::error::Error;
use crate::io::{BufMutExt, MySqlBufMutExt, ProtocolEncode};
use crate::protocol::auth::AuthPlugin;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_response.html
// https://mariadb.com/kb/en/connection/#client-handshake-response

#[derive(Debug)]
pub(crate) struct HandshakeResponse<'a> {
    pub(crate) schema: Option<&'a str>,

    /// Max size of a command packet that the client wants to send to the server
    pub(crate) max_packet_size: u32,

    /// Default collation for the connection
    pub(crate) collation: u8,

    /// Name of the SQL account which client wants to log in
    pub(crate) username: &'a str,

    /// Authentication method used by the client
    pub(crate) auth_plugin: Option<AuthPlugin>,

    /// Opaque authentication response
    pub(crate) auth_response: &'a [u8],
}

impl ProtocolEncode<'_, Capabilities> for HandshakeResponse<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities) -> Result<(), Error> {
        if !capabilities.contains(Capabilities::PROTOCOL_41) {
            return self.encode_320(buf, capabilities);
        }

        // only the low 32 bits travel here; MariaDB's extended bits are never requested
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32_le(capabilities.bits() as u32);
        buf.put_u32_le(self.max_packet_size);
        buf.put_u8(self.collation);

        // reserved
        buf.put_bytes(0, 23);

        buf.put_str_nul(self.username);

        if capabilities.contains(Capabilities::PLUGIN_AUTH_LENENC_DATA) {
            buf.put_bytes_lenenc(self.auth_response);
        } else if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let response_len = u8::try_from(self.auth_response.len()).map_err(|_| {
                err_protocol!("auth response too long: {}", self.auth_response.len())
            })?;

            buf.push(response_len);
            buf.extend_from_slice(self.auth_response);
        } else {
            buf.put_bytes_nul(self.auth_response);
        }

        if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            buf.put_str_nul(self.schema.unwrap_or_default());
        }

        if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.put_str_nul(self.auth_plugin.map_or("", AuthPlugin::name));
        }

        Ok(())
    }
}

impl HandshakeResponse<'_> {
    // HandshakeResponse320 for servers that do not speak the 4.1 protocol
    fn encode_320(&self, buf: &mut Vec<u8>, capabilities: Capabilities) -> Result<(), Error> {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u16_le(capabilities.bits() as u16);
        buf.put_uint_le(u64::from(self.max_packet_size.min(0xFF_FF_FF)), 3);
        buf.put_str_nul(self.username);

        if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            buf.put_bytes_nul(self.auth_response);
            buf.put_str_nul(self.schema.unwrap_or_default());
        } else {
            buf.extend_from_slice(self.auth_response);
        }

        Ok(())
    }
}
