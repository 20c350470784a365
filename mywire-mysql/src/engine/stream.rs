//! Reads and writes packets to and from the MySQL database server.
//!
//! Packets in MySQL are prefixed by 4 bytes: 3 for the payload length (in LE) and a
//! sequence id. A payload of exactly `0xFF_FF_FF` bytes is continued by the next packet,
//! so a message is a chain of full packets ended by a shorter (possibly empty) one.
//!
//! Control packets are read whole into [`Bytes`] and decoded with [`ProtocolDecode`]. Row
//! data is read field by field with the `read_*` methods, which cross the continuation
//! packets of a message transparently. Every read checks the bytes already buffered
//! before waiting on the socket.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_packets.html>

use std::cmp::min;

use bytes::{Bytes, BytesMut};
use mywire_core::net::{BufferedSocket, Buffers, Socket};

use crate::error::{Error, MySqlDatabaseError, ER_NET_PACKET_TOO_LARGE};
use crate::io::{ProtocolDecode, ProtocolEncode};
use crate::protocol::response::ErrPacket;
use crate::protocol::{Capabilities, Packet, MAX_PACKET_LEN};

pub(crate) struct MySqlStream {
    socket: BufferedSocket<Box<dyn Socket>>,
    pub(crate) capabilities: Capabilities,
    pub(crate) sequence_id: u8,

    // unread payload bytes of the current packet
    remaining: usize,

    // the current packet is full and another one continues the message
    continued: bool,

    // payload length of the first packet of the current message
    packet_len: usize,

    // size of the last command sent, reported when the server refuses it as too large
    last_command_len: usize,
}

impl MySqlStream {
    pub(crate) fn new(socket: Box<dyn Socket>, buffers: Buffers) -> Self {
        Self {
            socket: BufferedSocket::with_buffers(socket, buffers),
            capabilities: Capabilities::empty(),
            sequence_id: 0,
            remaining: 0,
            continued: false,
            packet_len: 0,
            last_command_len: 0,
        }
    }

    /// Payload length of the first packet of the message being read.
    pub(crate) fn packet_len(&self) -> usize {
        self.packet_len
    }

    /// Room for payload data in the read buffer.
    pub(crate) fn capacity(&self) -> usize {
        self.socket.capacity()
    }

    /// Data bytes per packet for an upload whose packets carry `header` bytes before the data.
    pub(crate) fn upload_chunk_len(&self, header: usize) -> usize {
        upload_chunk_len(self.capacity(), header)
    }

    pub(crate) fn write_buffer_len(&self) -> usize {
        self.socket.write_buffer().len()
    }

    /// Whether the current message has been read completely.
    pub(crate) fn at_end(&self) -> bool {
        self.remaining == 0 && !self.continued
    }

    async fn read_header(&mut self) -> Result<usize, Error> {
        self.socket.fill(4).await?;

        let header = self.socket.buffered();
        let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        let sequence_id = header[3];

        self.socket.consume(4);

        // replies continue the sequence of the packet they answer
        self.sequence_id = sequence_id.wrapping_add(1);
        self.remaining = len;
        self.continued = len == MAX_PACKET_LEN;

        Ok(len)
    }

    /// Start reading the next message. Unread bytes of the previous one are skipped.
    pub(crate) async fn begin_packet(&mut self) -> Result<usize, Error> {
        if !self.at_end() {
            self.finish_packet().await?;
        }

        let len = self.read_header().await?;
        self.packet_len = len;

        Ok(len)
    }

    // make at least one byte of the current message available, moving into its next
    // continuation packet if needed
    async fn ensure_payload(&mut self) -> Result<(), Error> {
        while self.remaining == 0 {
            if !self.continued {
                return Err(err_protocol!("attempted to read past the end of a packet"));
            }

            self.read_header().await?;
        }

        Ok(())
    }

    /// Look at the next byte of the message without consuming it.
    pub(crate) async fn peek_u8(&mut self) -> Result<u8, Error> {
        self.ensure_payload().await?;
        self.socket.fill(1).await?;

        Ok(self.socket.buffered()[0])
    }

    /// Fill `dst` from the message, across continuation packets.
    pub(crate) async fn read_into(&mut self, dst: &mut [u8]) -> Result<(), Error> {
        let mut offset = 0;

        while offset < dst.len() {
            self.ensure_payload().await?;

            let n = min(min(dst.len() - offset, self.remaining), self.socket.capacity());

            self.socket.fill(n).await?;
            dst[offset..offset + n].copy_from_slice(&self.socket.buffered()[..n]);
            self.socket.consume(n);

            self.remaining -= n;
            offset += n;
        }

        Ok(())
    }

    pub(crate) async fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0_u8; N];

        if self.remaining >= N && self.socket.buffered().len() >= N {
            out.copy_from_slice(&self.socket.buffered()[..N]);
            self.socket.consume(N);
            self.remaining -= N;
        } else {
            self.read_into(&mut out).await?;
        }

        Ok(out)
    }

    pub(crate) async fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_array::<1>().await?[0])
    }

    pub(crate) async fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.read_array().await?))
    }

    pub(crate) async fn read_u24(&mut self) -> Result<u32, Error> {
        let [a, b, c] = self.read_array().await?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    pub(crate) async fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.read_array().await?))
    }

    pub(crate) async fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.read_array().await?))
    }

    pub(crate) async fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_le_bytes(self.read_array().await?))
    }

    pub(crate) async fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_le_bytes(self.read_array().await?))
    }

    /// Read a length-encoded integer; `None` is the `0xFB` NULL marker.
    pub(crate) async fn read_lenenc(&mut self) -> Result<Option<u64>, Error> {
        Ok(match self.read_u8().await? {
            0xfb => None,
            0xfc => Some(u64::from(self.read_u16().await?)),
            0xfd => Some(u64::from(self.read_u24().await?)),
            0xfe => Some(self.read_u64().await?),
            0xff => return Err(err_protocol!("invalid length-encoded integer prefix 0xff")),
            v => Some(u64::from(v)),
        })
    }

    /// Read `n` bytes of the message.
    ///
    /// Bytes inside the current packet are split off the read buffer without copying.
    pub(crate) async fn read_bytes(&mut self, n: usize) -> Result<Bytes, Error> {
        if n == 0 {
            return Ok(Bytes::new());
        }

        if n <= self.remaining {
            self.socket.fill(n).await?;
            self.remaining -= n;

            return Ok(self.socket.take(n));
        }

        let mut buf = BytesMut::zeroed(n);
        self.read_into(&mut buf).await?;

        Ok(buf.freeze())
    }

    /// Discard `n` bytes of the message.
    pub(crate) async fn skip(&mut self, mut n: usize) -> Result<(), Error> {
        while n > 0 {
            self.ensure_payload().await?;

            let k = min(min(n, self.remaining), self.socket.capacity());

            self.socket.fill(k).await?;
            self.socket.consume(k);

            self.remaining -= k;
            n -= k;
        }

        Ok(())
    }

    /// Read whatever is left of the message.
    pub(crate) async fn read_rest(&mut self) -> Result<Bytes, Error> {
        let mut rest = self.read_bytes(self.remaining).await?;

        while self.continued {
            let len = self.read_header().await?;
            let next = self.read_bytes(len).await?;

            let mut joined = BytesMut::with_capacity(rest.len() + next.len());
            joined.extend_from_slice(&rest);
            joined.extend_from_slice(&next);
            rest = joined.freeze();
        }

        Ok(rest)
    }

    /// Discard whatever is left of the message.
    pub(crate) async fn finish_packet(&mut self) -> Result<(), Error> {
        loop {
            self.skip(self.remaining).await?;

            if !self.continued {
                return Ok(());
            }

            self.read_header().await?;
        }
    }

    /// Read one complete message. An `ERR` packet is returned as an error.
    pub(crate) async fn recv_packet(&mut self) -> Result<Packet<Bytes>, Error> {
        self.begin_packet().await?;

        let payload = self.read_rest().await?;

        if payload.first() == Some(&0xff) {
            return Err(self.error_from(ErrPacket::decode(payload)?));
        }

        Ok(Packet(payload))
    }

    pub(crate) async fn recv<'de, T>(&mut self) -> Result<T, Error>
    where
        T: ProtocolDecode<'de, Capabilities>,
    {
        self.recv_packet().await?.decode_with(self.capabilities)
    }

    /// Turn a server error into an [`Error`], recognizing a refused oversized command.
    pub(crate) fn error_from(&self, err: ErrPacket) -> Error {
        if err.error_code == ER_NET_PACKET_TOO_LARGE {
            return Error::TooLarge {
                size: self.last_command_len,
            };
        }

        MySqlDatabaseError(err).into()
    }

    /// Queue a packet, continuing the current sequence.
    pub(crate) fn write_packet<'en, T>(&mut self, payload: T) -> Result<(), Error>
    where
        T: ProtocolEncode<'en, Capabilities>,
    {
        let buf = self.socket.write_buffer_mut();
        Packet(payload).encode_with(buf, (self.capabilities, &mut self.sequence_id))?;

        Ok(())
    }

    /// Queue raw bytes as one packet of the current sequence.
    pub(crate) fn write_raw_packet(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.write_packet(payload)
    }

    /// Start a new command: queue `payload` as the first packet of a fresh sequence and
    /// send everything queued.
    pub(crate) async fn send_packet<'en, T>(&mut self, payload: T) -> Result<(), Error>
    where
        T: ProtocolEncode<'en, Capabilities>,
    {
        self.sequence_id = 0;

        let start = self.socket.write_buffer().len();
        self.write_packet(payload)?;
        self.last_command_len = self.socket.write_buffer().len() - start;

        self.flush().await
    }

    pub(crate) async fn flush(&mut self) -> Result<(), Error> {
        self.socket.flush().await?;
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) -> Result<(), Error> {
        self.socket.shutdown().await?;
        Ok(())
    }

    pub(crate) fn into_buffers(self) -> Buffers {
        self.socket.into_buffers()
    }
}

// Sized to the read buffer, and always short of a full packet: a full one would be followed
// by an empty continuation, which the server reads as the end of the upload.
fn upload_chunk_len(capacity: usize, header: usize) -> usize {
    capacity
        .saturating_sub(4 + header)
        .min(MAX_PACKET_LEN - 1 - header)
        .max(1)
}
