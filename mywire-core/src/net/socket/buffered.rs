use std::cmp;
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::net::Socket;

// Tokio, async-std, and std all use this as the default capacity for their buffered I/O.
const DEFAULT_BUF_SIZE: usize = 8192;

/// A socket with one read buffer and one write buffer, both reused for the life of the
/// connection.
///
/// Unconsumed input lives at the front of the read buffer. Consuming bytes advances past
/// them; the allocation is compacted or grown by [`BytesMut::reserve`] when more room is
/// needed.
pub struct BufferedSocket<S> {
    socket: S,
    write_buf: Vec<u8>,
    read_buf: BytesMut,
}

/// The detached buffers of a closed socket, kept so a new connection can skip the allocation.
#[derive(Debug, Default)]
pub struct Buffers {
    read: BytesMut,
    write: Vec<u8>,
}

impl Buffers {
    pub fn new() -> Self {
        Buffers {
            read: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
            write: Vec::with_capacity(DEFAULT_BUF_SIZE),
        }
    }

    pub fn capacity(&self) -> usize {
        self.read.capacity()
    }
}

impl<S: Socket> BufferedSocket<S> {
    pub fn new(socket: S) -> Self {
        Self::with_buffers(socket, Buffers::new())
    }

    pub fn with_buffers(socket: S, mut buffers: Buffers) -> Self {
        buffers.read.clear();
        buffers.write.clear();

        if buffers.read.capacity() < DEFAULT_BUF_SIZE {
            buffers.read.reserve(DEFAULT_BUF_SIZE);
        }

        BufferedSocket {
            socket,
            write_buf: buffers.write,
            read_buf: buffers.read,
        }
    }

    /// Bytes received but not consumed yet.
    #[inline]
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Capacity of the read buffer; reads larger than this are served in several fills.
    pub fn capacity(&self) -> usize {
        cmp::max(self.read_buf.capacity(), DEFAULT_BUF_SIZE)
    }

    /// Wait until at least `len` bytes are buffered.
    pub async fn fill(&mut self, len: usize) -> io::Result<()> {
        while self.read_buf.len() < len {
            self.read_more(len).await?;
        }

        Ok(())
    }

    /// Wait until at least one more byte than is currently buffered has arrived.
    pub async fn fill_more(&mut self) -> io::Result<usize> {
        let want = self.read_buf.len() + 1;
        self.read_more(want).await
    }

    async fn read_more(&mut self, len: usize) -> io::Result<usize> {
        let additional = cmp::max(len.saturating_sub(self.read_buf.len()), DEFAULT_BUF_SIZE);
        self.read_buf.reserve(additional);

        let read = self.socket.read_buf(&mut self.read_buf).await?;

        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "server disconnected: expected to read {} bytes, got {} bytes at EOF",
                    len,
                    self.read_buf.len()
                ),
            ));
        }

        Ok(read)
    }

    /// Discard `n` buffered bytes.
    ///
    /// # Panics
    /// If fewer than `n` bytes are buffered.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        let _ = self.read_buf.split_to(n);
    }

    /// Split off `n` buffered bytes.
    #[inline]
    pub fn take(&mut self, n: usize) -> Bytes {
        self.read_buf.split_to(n).freeze()
    }

    pub async fn read_buffered(&mut self, len: usize) -> io::Result<BytesMut> {
        self.fill(len).await?;

        Ok(self.read_buf.split_to(len))
    }

    pub fn write_buffer(&self) -> &[u8] {
        &self.write_buf
    }

    pub fn write_buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.write_buf
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.socket.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }

        self.socket.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.socket.shutdown().await
    }

    /// Detach the buffers so they can be handed to a future connection.
    pub fn into_buffers(self) -> Buffers {
        Buffers {
            read: self.read_buf,
            write: self.write_buf,
        }
    }

    pub fn boxed(self) -> BufferedSocket<Box<dyn Socket>> {
        BufferedSocket {
            socket: Box::new(self.socket),
            write_buf: self.write_buf,
            read_buf: self.read_buf,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn it_fills_across_partial_writes() -> io::Result<()> {
        let (client, mut server) = tokio::io::duplex(64);
        let mut socket = BufferedSocket::new(client);

        server.write_all(b"\x01\x00").await?;

        let writer = tokio::spawn(async move {
            server.write_all(b"\x00\x07").await?;
            server.write_all(b"payload").await?;
            io::Result::Ok(server)
        });

        socket.fill(4).await?;
        assert_eq!(&socket.buffered()[..4], b"\x01\x00\x00\x07");
        socket.consume(4);

        let payload = socket.read_buffered(7).await?;
        assert_eq!(&payload[..], b"payload");

        drop(writer.await);

        Ok(())
    }

    #[tokio::test]
    async fn it_reports_eof_as_disconnect() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);

        let mut socket = BufferedSocket::new(client);
        let err = socket.fill(1).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn it_recycles_buffers() -> io::Result<()> {
        let (client, mut server) = tokio::io::duplex(64);
        let mut socket = BufferedSocket::new(client);

        socket.write_buffer_mut().extend_from_slice(b"ping");
        socket.flush().await?;

        let mut echo = [0u8; 4];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut echo).await?;
        assert_eq!(&echo, b"ping");

        let buffers = socket.into_buffers();
        assert!(buffers.capacity() >= DEFAULT_BUF_SIZE);

        let (client, _server) = tokio::io::duplex(64);
        let socket = BufferedSocket::with_buffers(client, buffers);
        assert!(socket.buffered().is_empty());
        assert!(socket.write_buffer().is_empty());

        Ok(())
    }
}
