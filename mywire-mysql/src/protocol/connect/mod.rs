//! Connection phase packets.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase.html>

mod auth_switch;
mod handshake;
mod handshake_response;

pub(crate) use auth_switch::AuthSwitchRequest;
pub(crate) use handshake::Handshake;
pub(crate) use handshake_response::HandshakeResponse;
