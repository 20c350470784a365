use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{BufExt, MySqlBufExt, ProtocolDecode};
use crate::protocol::{Capabilities, Status};

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_v10.html
// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_v9.html
// https://mariadb.com/kb/en/connection/#initial-handshake-packet

/// The initial packet sent by the server on a new connection.
#[derive(Debug)]
pub(crate) struct Handshake {
    pub(crate) protocol_version: u8,
    pub(crate) server_version: String,
    pub(crate) connection_id: u32,
    pub(crate) server_capabilities: Capabilities,
    pub(crate) server_default_collation: u8,
    pub(crate) status: Status,
    pub(crate) auth_plugin_name: Option<String>,

    /// The scramble, both parts joined, without the trailing NUL.
    pub(crate) auth_plugin_data: Bytes,
}

impl ProtocolDecode<'_> for Handshake {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        let protocol_version = buf.get_u8_checked()?;
        if protocol_version < 9 {
            return Err(err_protocol!(
                "unsupported handshake protocol version {}",
                protocol_version
            ));
        }

        let server_version = buf.get_str_nul()?;
        let connection_id = buf.get_u32_checked()?;

        if protocol_version == 9 {
            // the v9 handshake ends with a NUL-terminated 8 byte scramble
            let auth_plugin_data = buf.get_bytes_eof();

            return Ok(Self {
                protocol_version,
                server_version,
                connection_id,
                server_capabilities: Capabilities::empty(),
                server_default_collation: 0,
                status: Status::empty(),
                auth_plugin_name: None,
                auth_plugin_data,
            });
        }

        let auth_plugin_data_1 = buf.get_bytes(8)?;

        // filler
        buf.get_u8_checked()?;

        let capabilities_1 = buf.get_u16_checked()?;
        let mut capabilities = Capabilities::from_bits_truncate(capabilities_1.into());

        if buf.is_empty() {
            // a 4.0 server may end the packet here
            return Ok(Self {
                protocol_version,
                server_version,
                connection_id,
                server_capabilities: capabilities,
                server_default_collation: 0,
                status: Status::empty(),
                auth_plugin_name: None,
                auth_plugin_data: auth_plugin_data_1,
            });
        }

        let server_default_collation = buf.get_u8_checked()?;
        let status = Status::from_bits_truncate(buf.get_u16_checked()?);

        let capabilities_2 = buf.get_u16_checked()?;
        capabilities |= Capabilities::from_bits_truncate(u64::from(capabilities_2) << 16);

        let auth_plugin_data_len = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.get_u8_checked()?
        } else {
            buf.get_u8_checked()?;
            0
        };

        // reserved
        buf.get_bytes(6)?;

        // MariaDB reuses the last 4 reserved bytes for its extended capabilities, announced by
        // clearing the CLIENT_MYSQL (LONG_PASSWORD) bit
        let capabilities_3 = buf.get_u32_checked()?;
        if !capabilities.contains(Capabilities::LONG_PASSWORD) {
            capabilities |= Capabilities::from_bits_truncate(u64::from(capabilities_3) << 32);
        }

        let auth_plugin_data_2 = if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let len = usize::from(auth_plugin_data_len).saturating_sub(8).max(13);
            let len = len.min(buf.remaining());

            let mut part = buf.get_bytes(len)?;
            if part.last() == Some(&0) {
                part.truncate(part.len() - 1);
            }

            part
        } else {
            Bytes::new()
        };

        let auth_plugin_name = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            let name = buf.get_bytes_eof();
            Some(
                String::from_utf8(name.to_vec())
                    .map_err(|err| err_protocol!("auth plugin name: {}", err))?,
            )
        } else {
            None
        };

        let mut auth_plugin_data =
            Vec::with_capacity(auth_plugin_data_1.len() + auth_plugin_data_2.len());
        auth_plugin_data.extend_from_slice(&auth_plugin_data_1);
        auth_plugin_data.extend_from_slice(&auth_plugin_data_2);

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            server_capabilities: capabilities,
            server_default_collation,
            status,
            auth_plugin_name,
            auth_plugin_data: auth_plugin_data.into(),
        })
    }
}

#[test]
fn test_decode_handshake_mysql_8_0_18() {
    const HANDSHAKE_MYSQL_8_0_18: &[u8] = b"\n8.0.18\x00\x19\x00\x00\x00\x114aB0c\x06g\x00\xff\xff\xff\x02\x00\xff\xc7\x15\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00L\x03s\x0f[4\rl4. !\x00caching_sha2_password\x00";

    let p = Handshake::decode(HANDSHAKE_MYSQL_8_0_18.into()).unwrap();

    assert_eq!(p.protocol_version, 10);
    assert_eq!(p.server_version, "8.0.18");
    assert_eq!(p.connection_id, 25);

    assert!(p.server_capabilities.contains(
        Capabilities::PROTOCOL_41
            | Capabilities::PLUGIN_AUTH
            | Capabilities::SECURE_CONNECTION
            | Capabilities::DEPRECATE_EOF
            | Capabilities::SESSION_TRACK
    ));

    // a MySQL server keeps CLIENT_MYSQL set, so no MariaDB bits are read
    assert!(!p
        .server_capabilities
        .contains(Capabilities::MARIADB_CLIENT_PROGRESS));

    assert_eq!(p.server_default_collation, 255);
    assert!(p.status.contains(Status::AUTOCOMMIT));
    assert_eq!(p.auth_plugin_name.as_deref(), Some("caching_sha2_password"));
    assert_eq!(
        &*p.auth_plugin_data,
        &[17, 52, 97, 66, 48, 99, 6, 103, 76, 3, 115, 15, 91, 52, 13, 108, 52, 46, 32, 33][..]
    );
}

#[test]
fn test_decode_handshake_mariadb_10_4_7() {
    const HANDSHAKE_MARIA_DB_10_4_7: &[u8] = b"\n5.5.5-10.4.7-MariaDB-1:10.4.7+maria~bionic\x00\x0b\x00\x00\x00t6L\\j\"dS\x00\xfe\xf7\x08\x02\x00\xff\x81\x15\x00\x00\x00\x00\x00\x00\x07\x00\x00\x00U14Oph9\"<H5n\x00mysql_native_password\x00";

    let p = Handshake::decode(HANDSHAKE_MARIA_DB_10_4_7.into()).unwrap();

    assert_eq!(p.protocol_version, 10);
    assert_eq!(p.server_version, "5.5.5-10.4.7-MariaDB-1:10.4.7+maria~bionic");
    assert_eq!(p.connection_id, 11);

    // CLIENT_MYSQL is cleared, so the extended capabilities are read
    assert!(!p.server_capabilities.contains(Capabilities::LONG_PASSWORD));
    assert!(p.server_capabilities.contains(
        Capabilities::MARIADB_CLIENT_PROGRESS
            | Capabilities::MARIADB_CLIENT_COM_MULTI
            | Capabilities::MARIADB_CLIENT_STMT_BULK_OPERATIONS
    ));

    assert_eq!(p.server_default_collation, 8);
    assert!(p.status.contains(Status::AUTOCOMMIT));
    assert_eq!(p.auth_plugin_name.as_deref(), Some("mysql_native_password"));
    assert_eq!(
        &*p.auth_plugin_data,
        &[116, 54, 76, 92, 106, 34, 100, 83, 85, 49, 52, 79, 112, 104, 57, 34, 60, 72, 53, 110][..]
    );
}

#[test]
fn test_decode_handshake_v9() {
    const HANDSHAKE_V9: &[u8] = b"\x093.22.32\x00\x05\x00\x00\x00abcdefgh\x00";

    let p = Handshake::decode(HANDSHAKE_V9.into()).unwrap();

    assert_eq!(p.protocol_version, 9);
    assert_eq!(p.server_version, "3.22.32");
    assert_eq!(p.connection_id, 5);
    assert!(p.server_capabilities.is_empty());
    assert_eq!(&*p.auth_plugin_data, b"abcdefgh");
}

#[test]
fn test_decode_handshake_rejects_old_protocol() {
    assert!(Handshake::decode(Bytes::from_static(b"\x08x\x00")).is_err());
}
