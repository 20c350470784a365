//! Prepared statement commands.

mod execute;
mod long_data;
mod prepare;
mod stmt_close;

pub(crate) use execute::{json_text, param_type, Execute, ExecuteParam};
pub(crate) use long_data::{SendLongData, SEND_LONG_DATA_HEADER_LEN};
pub(crate) use prepare::{Prepare, PrepareOk};
pub(crate) use stmt_close::StmtClose;
