//! Generic response packets.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_response_packets.html>
//! <https://mariadb.com/kb/en/4-server-response-packets/>

mod eof;
mod err;
mod info;
mod local_infile;
mod ok;
mod session_state;

pub(crate) use eof::EofPacket;
pub(crate) use err::ErrPacket;
pub(crate) use info::Info;
pub(crate) use local_infile::LocalInfilePacket;
pub(crate) use ok::OkPacket;
pub(crate) use session_state::SessionStateChange;
