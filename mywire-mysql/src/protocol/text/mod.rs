//! Text protocol and utility commands.

mod ping;
mod query;
mod quit;
mod reset;

pub(crate) use ping::Ping;
pub(crate) use query::Query;
pub(crate) use quit::Quit;
pub(crate) use reset::ResetConnection;
