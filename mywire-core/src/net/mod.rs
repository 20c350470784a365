mod socket;

pub use socket::{connect_tcp, BufferedSocket, Buffers, Socket};

#[cfg(unix)]
pub use socket::connect_uds;
