mod buf;
mod buf_mut;

pub(crate) use buf::MySqlBufExt;
pub(crate) use buf_mut::{lenenc_len, MySqlBufMutExt};

pub(crate) use mywire_core::io::{BufExt, BufMutExt, ProtocolDecode, ProtocolEncode};
