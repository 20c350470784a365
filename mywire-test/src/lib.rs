use std::env;

use anyhow::{bail, Context};
use mywire::mysql::{ColumnType, MySqlConnectOptions, MySqlConnection};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn setup_if_needed() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Options for the live server named by `DATABASE_URL`, or `None` to skip live tests.
pub fn live_options() -> anyhow::Result<Option<MySqlConnectOptions>> {
    setup_if_needed();

    match env::var("DATABASE_URL") {
        Ok(url) => Ok(Some(url.parse()?)),
        Err(_) => {
            log::warn!("DATABASE_URL is not set; skipping");
            Ok(None)
        }
    }
}

// Make a new connection to the live server, or `None` without one
pub async fn connect() -> anyhow::Result<Option<MySqlConnection>> {
    match live_options()? {
        Some(options) => Ok(Some(MySqlConnection::connect(options).await?)),
        None => Ok(None),
    }
}

const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

// LONG_PASSWORD | FOUND_ROWS | LONG_FLAG | CONNECT_WITH_DB | LOCAL_FILES | PROTOCOL_41
// | TRANSACTIONS | SECURE_CONNECTION | MULTI_STATEMENTS | MULTI_RESULTS | PS_MULTI_RESULTS
// | PLUGIN_AUTH
const SERVER_CAPABILITIES: u32 = 0x0000_0001
    | 0x0000_0002
    | 0x0000_0004
    | 0x0000_0008
    | 0x0000_0080
    | 0x0000_0200
    | 0x0000_2000
    | 0x0000_8000
    | 0x0001_0000
    | 0x0002_0000
    | 0x0004_0000
    | 0x0008_0000;

/// A scripted MySQL server on a local TCP port.
///
/// Each accepted connection goes through the handshake and accepts any credentials. The
/// test then plays the server's side of the conversation with [`MockSession`].
pub struct MockServer {
    listener: TcpListener,
    next_id: u32,
}

impl MockServer {
    pub async fn bind() -> anyhow::Result<Self> {
        setup_if_needed();

        let listener = TcpListener::bind("127.0.0.1:0").await?;

        Ok(MockServer {
            listener,
            next_id: 1,
        })
    }

    /// Options pointing at this server.
    pub fn options(&self) -> anyhow::Result<MySqlConnectOptions> {
        let port = self.listener.local_addr()?.port();

        Ok(MySqlConnectOptions::new()
            .host("127.0.0.1")
            .port(port)
            .username("root"))
    }

    /// Accept the next connection and complete its handshake.
    pub async fn accept(&mut self) -> anyhow::Result<MockSession> {
        let (stream, _) = self.listener.accept().await?;

        let mut session = MockSession {
            stream,
            seq: 0,
            connection_id: self.next_id,
        };

        self.next_id += 1;

        session.handshake().await?;

        Ok(session)
    }

    /// Accept the next connection without greeting it, leaving the client waiting for
    /// the handshake.
    pub async fn accept_silent(&mut self) -> anyhow::Result<TcpStream> {
        let (stream, _) = self.listener.accept().await?;

        Ok(stream)
    }
}

/// The server's end of one connection.
pub struct MockSession {
    stream: TcpStream,
    seq: u8,
    connection_id: u32,
}

impl MockSession {
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    async fn handshake(&mut self) -> anyhow::Result<()> {
        let mut packet = vec![10];
        packet.extend_from_slice(b"8.0.36-mock\0");
        packet.extend_from_slice(&self.connection_id.to_le_bytes());
        packet.extend_from_slice(b"01234567");
        packet.push(0);
        packet.extend_from_slice(&SERVER_CAPABILITIES.to_le_bytes()[..2]);
        packet.push(255);
        packet.extend_from_slice(&SERVER_STATUS_AUTOCOMMIT.to_le_bytes());
        packet.extend_from_slice(&SERVER_CAPABILITIES.to_le_bytes()[2..]);
        packet.push(21);
        packet.extend_from_slice(&[0; 10]);
        packet.extend_from_slice(b"89abcdefghij\0");
        packet.extend_from_slice(b"mysql_native_password\0");

        self.seq = 0;
        self.write_packet(&packet).await?;

        let _response = self.read_packet().await?;
        self.ok().await
    }

    /// Read one client packet. The sequence continues from it.
    pub async fn read_packet(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut header = [0_u8; 4];
        self.stream
            .read_exact(&mut header)
            .await
            .context("client closed the connection")?;

        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut payload = vec![0; len];
        self.stream.read_exact(&mut payload).await?;

        self.seq = header[3].wrapping_add(1);

        Ok(payload)
    }

    /// Read the next command and check that it is `COM_QUERY` with the given text.
    pub async fn expect_query(&mut self, sql: &str) -> anyhow::Result<()> {
        let packet = self.read_packet().await?;

        match packet.split_first() {
            Some((0x03, text)) if text == sql.as_bytes() => Ok(()),
            Some((0x03, text)) => bail!(
                "expected query {sql:?}, got {:?}",
                String::from_utf8_lossy(text)
            ),
            _ => bail!("expected COM_QUERY, got {packet:?}"),
        }
    }

    pub async fn write_packet(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let len = u32::try_from(payload.len())?;

        let mut frame = len.to_le_bytes()[..3].to_vec();
        frame.push(self.seq);
        frame.extend_from_slice(payload);

        self.stream.write_all(&frame).await?;
        self.seq = self.seq.wrapping_add(1);

        Ok(())
    }

    pub async fn ok(&mut self) -> anyhow::Result<()> {
        self.ok_with(0, 0, SERVER_STATUS_AUTOCOMMIT).await
    }

    pub async fn ok_with(
        &mut self,
        affected_rows: u64,
        last_insert_id: u64,
        status: u16,
    ) -> anyhow::Result<()> {
        let mut packet = vec![0x00];
        put_uint_lenenc(&mut packet, affected_rows);
        put_uint_lenenc(&mut packet, last_insert_id);
        packet.extend_from_slice(&status.to_le_bytes());
        packet.extend_from_slice(&[0, 0]);

        self.write_packet(&packet).await
    }

    pub async fn err(&mut self, code: u16, state: &str, message: &str) -> anyhow::Result<()> {
        let mut packet = vec![0xff];
        packet.extend_from_slice(&code.to_le_bytes());
        packet.push(b'#');
        packet.extend_from_slice(state.as_bytes());
        packet.extend_from_slice(message.as_bytes());

        self.write_packet(&packet).await
    }

    pub async fn eof(&mut self, status: u16) -> anyhow::Result<()> {
        let mut packet = vec![0xfe, 0, 0];
        packet.extend_from_slice(&status.to_le_bytes());

        self.write_packet(&packet).await
    }

    /// Column count, definitions and the EOF ending them.
    pub async fn columns(&mut self, columns: &[(&str, ColumnType)]) -> anyhow::Result<()> {
        let mut count = Vec::new();
        put_uint_lenenc(&mut count, columns.len() as u64);
        self.write_packet(&count).await?;

        self.column_defs(columns).await
    }

    /// Column or parameter definitions and the EOF ending them.
    pub async fn column_defs(&mut self, columns: &[(&str, ColumnType)]) -> anyhow::Result<()> {
        for (name, ty) in columns {
            self.write_packet(&column_def(name, *ty)).await?;
        }

        if !columns.is_empty() {
            self.eof(SERVER_STATUS_AUTOCOMMIT).await?;
        }

        Ok(())
    }

    pub async fn text_row(&mut self, values: &[Option<&str>]) -> anyhow::Result<()> {
        let mut packet = Vec::new();

        for value in values {
            match value {
                Some(value) => put_bytes_lenenc(&mut packet, value.as_bytes()),
                None => packet.push(0xfb),
            }
        }

        self.write_packet(&packet).await
    }

    /// A whole text resultset: head, rows and the terminating EOF.
    pub async fn resultset(
        &mut self,
        columns: &[(&str, ColumnType)],
        rows: &[&[Option<&str>]],
        status: u16,
    ) -> anyhow::Result<()> {
        self.columns(columns).await?;

        for row in rows {
            self.text_row(row).await?;
        }

        self.eof(status).await
    }

    /// `COM_STMT_PREPARE_OK` with its parameter and column definitions.
    pub async fn prepare_ok(
        &mut self,
        statement: u32,
        params: &[(&str, ColumnType)],
        columns: &[(&str, ColumnType)],
    ) -> anyhow::Result<()> {
        let mut packet = vec![0x00];
        packet.extend_from_slice(&statement.to_le_bytes());
        packet.extend_from_slice(&u16::try_from(columns.len())?.to_le_bytes());
        packet.extend_from_slice(&u16::try_from(params.len())?.to_le_bytes());
        packet.push(0);
        packet.extend_from_slice(&[0, 0]);

        self.write_packet(&packet).await?;
        self.column_defs(params).await?;
        self.column_defs(columns).await
    }

    /// Wait until the client closes the connection. Returns what it sent meanwhile.
    pub async fn read_to_end(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await?;

        Ok(rest)
    }
}

fn column_def(name: &str, ty: ColumnType) -> Vec<u8> {
    let mut buf = Vec::new();

    for part in ["def", "test", "t", "t", name, name] {
        put_bytes_lenenc(&mut buf, part.as_bytes());
    }

    buf.push(0x0c);
    buf.extend_from_slice(&224_u16.to_le_bytes());
    buf.extend_from_slice(&1024_u32.to_le_bytes());
    buf.push(ty.id());
    buf.extend_from_slice(&[0, 0, 0, 0, 0]);

    buf
}

fn put_uint_lenenc(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=250 => buf.push(value as u8),
        251..=0xff_ff => {
            buf.push(0xfc);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_00_00..=0xff_ff_ff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
        }
        _ => {
            buf.push(0xfe);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn put_bytes_lenenc(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_uint_lenenc(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}
