//! A scripted server on the other end of an in-memory pipe, for engine tests.

use std::sync::Arc;

use mywire_core::net::{Buffers, Socket};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::engine::MySqlEngine;
use crate::io::MySqlBufMutExt;
use crate::options::MySqlConnectOptions;
use crate::protocol::{Capabilities, Status};
use crate::type_id::{ColumnFlags, ColumnType};

pub(crate) const HANDSHAKE_NONCE: &[u8] = b"0123456789abcdefghij";

const SERVER_CAPABILITIES: Capabilities = Capabilities::LONG_PASSWORD
    .union(Capabilities::FOUND_ROWS)
    .union(Capabilities::LONG_FLAG)
    .union(Capabilities::CONNECT_WITH_DB)
    .union(Capabilities::LOCAL_FILES)
    .union(Capabilities::IGNORE_SPACE)
    .union(Capabilities::PROTOCOL_41)
    .union(Capabilities::TRANSACTIONS)
    .union(Capabilities::SECURE_CONNECTION)
    .union(Capabilities::MULTI_STATEMENTS)
    .union(Capabilities::MULTI_RESULTS)
    .union(Capabilities::PS_MULTI_RESULTS)
    .union(Capabilities::PLUGIN_AUTH)
    .union(Capabilities::PLUGIN_AUTH_LENENC_DATA)
    .union(Capabilities::SESSION_TRACK);

pub(crate) struct MockServer {
    io: DuplexStream,
    seq: u8,
    deprecate_eof: bool,
}

pub(crate) fn column_def(name: &str, ty: ColumnType) -> Vec<u8> {
    column_def_with(name, ty, ColumnFlags::empty(), 224)
}

pub(crate) fn column_def_with(
    name: &str,
    ty: ColumnType,
    flags: ColumnFlags,
    charset: u16,
) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.put_str_lenenc("def");
    buf.put_str_lenenc("test");
    buf.put_str_lenenc("t");
    buf.put_str_lenenc("t");
    buf.put_str_lenenc(name);
    buf.put_str_lenenc(name);
    buf.push(0x0c);
    buf.extend_from_slice(&charset.to_le_bytes());
    buf.extend_from_slice(&1024_u32.to_le_bytes());
    buf.push(ty as u8);
    buf.extend_from_slice(&flags.bits().to_le_bytes());
    buf.push(0);
    buf.extend_from_slice(&[0, 0]);

    buf
}

impl MockServer {
    pub(crate) fn pair() -> (Box<dyn Socket>, MockServer) {
        Self::pair_with(false)
    }

    pub(crate) fn pair_with(deprecate_eof: bool) -> (Box<dyn Socket>, MockServer) {
        let (client, server) = tokio::io::duplex(1 << 20);

        let server = MockServer {
            io: server,
            seq: 0,
            deprecate_eof,
        };

        (Box::new(client), server)
    }

    /// An engine that went through the handshake with default options.
    pub(crate) async fn connected() -> (MySqlEngine, MockServer) {
        Self::connected_with(MySqlConnectOptions::new().username("root"), false).await
    }

    pub(crate) async fn connected_with(
        options: MySqlConnectOptions,
        deprecate_eof: bool,
    ) -> (MySqlEngine, MockServer) {
        let (socket, mut server) = Self::pair_with(deprecate_eof);

        let serve = async move {
            server.handshake("mysql_native_password").await;
            let _ = server.read_packet().await;
            server.ok().await;
            server
        };

        let (engine, server) = tokio::join!(
            MySqlEngine::establish_with(socket, Arc::new(options), Buffers::new()),
            serve
        );

        (engine.unwrap(), server)
    }

    pub(crate) async fn handshake(&mut self, plugin: &str) {
        let mut capabilities = SERVER_CAPABILITIES;
        if self.deprecate_eof {
            capabilities |= Capabilities::DEPRECATE_EOF;
        }

        #[allow(clippy::cast_possible_truncation)]
        let bits = capabilities.bits() as u32;

        let mut packet = vec![10];
        packet.extend_from_slice(b"8.0.36-mock\0");
        packet.extend_from_slice(&7_u32.to_le_bytes());
        packet.extend_from_slice(&HANDSHAKE_NONCE[..8]);
        packet.push(0);
        packet.extend_from_slice(&bits.to_le_bytes()[..2]);
        packet.push(255);
        packet.extend_from_slice(&Status::AUTOCOMMIT.bits().to_le_bytes());
        packet.extend_from_slice(&bits.to_le_bytes()[2..]);
        packet.push(21);
        packet.extend_from_slice(&[0; 10]);
        packet.extend_from_slice(&HANDSHAKE_NONCE[8..]);
        packet.push(0);
        packet.extend_from_slice(plugin.as_bytes());
        packet.push(0);

        self.seq = 0;
        self.write_packet(&packet).await;
    }

    pub(crate) async fn read_packet_with_seq(&mut self) -> (u8, Vec<u8>) {
        let mut header = [0_u8; 4];
        self.io.read_exact(&mut header).await.unwrap();

        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut payload = vec![0; len];
        self.io.read_exact(&mut payload).await.unwrap();

        self.seq = header[3].wrapping_add(1);

        (header[3], payload)
    }

    pub(crate) async fn read_packet(&mut self) -> Vec<u8> {
        self.read_packet_with_seq().await.1
    }

    /// Write one packet, continuing the sequence of the last packet read.
    pub(crate) async fn write_packet(&mut self, payload: &[u8]) {
        let len = u32::try_from(payload.len()).unwrap();
        assert!(len < 0xff_ff_ff);

        let mut frame = len.to_le_bytes()[..3].to_vec();
        frame.push(self.seq);
        frame.extend_from_slice(payload);

        self.io.write_all(&frame).await.unwrap();
        self.seq = self.seq.wrapping_add(1);
    }

    pub(crate) async fn ok(&mut self) {
        self.ok_with(0, 0, Status::AUTOCOMMIT.bits(), 0, "").await;
    }

    pub(crate) async fn ok_with(
        &mut self,
        affected_rows: u64,
        last_insert_id: u64,
        status: u16,
        warnings: u16,
        info: &str,
    ) {
        let packet = ok_packet(0x00, affected_rows, last_insert_id, status, warnings, info);
        self.write_packet(&packet).await;
    }

    pub(crate) async fn ok_schema_change(&mut self, schema: &str) {
        let status = (Status::AUTOCOMMIT | Status::SESSION_STATE_CHANGED).bits();

        let mut packet = ok_packet(0x00, 0, 0, status, 0, "");

        let mut block = Vec::new();
        block.put_str_lenenc(schema);

        let mut state = vec![0x01];
        state.put_bytes_lenenc(&block);

        packet.put_bytes_lenenc(&state);

        self.write_packet(&packet).await;
    }

    pub(crate) async fn err(&mut self, code: u16, state: &str, message: &str) {
        let mut packet = vec![0xff];
        packet.extend_from_slice(&code.to_le_bytes());
        packet.push(b'#');
        packet.extend_from_slice(state.as_bytes());
        packet.extend_from_slice(message.as_bytes());

        self.write_packet(&packet).await;
    }

    /// End a column list (without `DEPRECATE_EOF`) or a row stream.
    pub(crate) async fn eof(&mut self, status: u16) {
        if self.deprecate_eof {
            let packet = ok_packet(0xfe, 0, 0, status, 0, "");
            self.write_packet(&packet).await;
        } else {
            let mut packet = vec![0xfe, 0, 0];
            packet.extend_from_slice(&status.to_le_bytes());
            self.write_packet(&packet).await;
        }
    }

    /// The head of a resultset: column count and definitions.
    pub(crate) async fn columns(&mut self, defs: &[Vec<u8>]) {
        let mut count = Vec::new();
        count.put_uint_lenenc(defs.len() as u64);
        self.write_packet(&count).await;

        self.column_defs(defs).await;
    }

    /// Column or parameter definitions, followed by an EOF without `DEPRECATE_EOF`.
    pub(crate) async fn column_defs(&mut self, defs: &[Vec<u8>]) {
        for def in defs {
            self.write_packet(def).await;
        }

        if !defs.is_empty() && !self.deprecate_eof {
            let mut packet = vec![0xfe, 0, 0];
            packet.extend_from_slice(&Status::AUTOCOMMIT.bits().to_le_bytes());
            self.write_packet(&packet).await;
        }
    }

    pub(crate) async fn text_row(&mut self, values: &[Option<&str>]) {
        let mut packet = Vec::new();

        for value in values {
            match value {
                Some(value) => packet.put_str_lenenc(value),
                None => packet.push(0xfb),
            }
        }

        self.write_packet(&packet).await;
    }

    pub(crate) async fn prepare_ok(&mut self, statement: u32, params: u16, columns: u16) {
        let mut packet = vec![0x00];
        packet.extend_from_slice(&statement.to_le_bytes());
        packet.extend_from_slice(&columns.to_le_bytes());
        packet.extend_from_slice(&params.to_le_bytes());
        packet.push(0);
        packet.extend_from_slice(&0_u16.to_le_bytes());

        self.write_packet(&packet).await;
    }

    /// Read until the client closes its end.
    pub(crate) async fn read_to_end(&mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        let _ = self.io.read_to_end(&mut rest).await;
        rest
    }
}

fn ok_packet(
    header: u8,
    affected_rows: u64,
    last_insert_id: u64,
    status: u16,
    warnings: u16,
    info: &str,
) -> Vec<u8> {
    let mut packet = vec![header];
    packet.put_uint_lenenc(affected_rows);
    packet.put_uint_lenenc(last_insert_id);
    packet.extend_from_slice(&status.to_le_bytes());
    packet.extend_from_slice(&warnings.to_le_bytes());
    packet.put_str_lenenc(info);
    packet
}
