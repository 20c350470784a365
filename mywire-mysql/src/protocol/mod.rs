pub(crate) mod auth;
mod capabilities;
pub(crate) mod column_def;
pub(crate) mod connect;
mod packet;
pub(crate) mod response;
pub(crate) mod statement;
mod status;
pub(crate) mod text;

pub use capabilities::Capabilities;
pub(crate) use column_def::ColumnDefinition;
pub(crate) use packet::{Packet, MAX_PACKET_LEN};
pub use status::Status;
