use std::io;
#[cfg(unix)]
use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

pub use buffered::{BufferedSocket, Buffers};

mod buffered;

/// A bidirectional byte stream a connection can run over.
///
/// Implemented for every tokio stream, which covers TCP, Unix domain sockets and
/// in-memory pipes alike.
pub trait Socket: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<S> Socket for S where S: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub async fn connect_tcp(host: &str, port: u16) -> io::Result<Box<dyn Socket>> {
    // IPv6 addresses in URLs will be wrapped in brackets and the `url` crate doesn't trim those.
    let host = host.trim_matches(&['[', ']'][..]);

    let stream = tokio::net::TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;

    Ok(Box::new(stream))
}

/// Connect a Unix Domain Socket at the given path.
#[cfg(unix)]
pub async fn connect_uds(path: impl AsRef<Path>) -> io::Result<Box<dyn Socket>> {
    let stream = tokio::net::UnixStream::connect(path).await?;

    Ok(Box::new(stream))
}
