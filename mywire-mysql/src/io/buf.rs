use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::BufExt;

pub(crate) trait MySqlBufExt: Buf {
    // Read a length-encoded integer.
    // `None` is the 0xfb NULL marker, which only appears in row data.
    // <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_dt_integers.html>
    fn get_uint_lenenc(&mut self) -> Result<Option<u64>, Error>;

    // Read a length-encoded string.
    fn get_str_lenenc(&mut self) -> Result<String, Error>;

    // Read a length-encoded byte sequence.
    fn get_bytes_lenenc(&mut self) -> Result<Bytes, Error>;

    fn get_u16_checked(&mut self) -> Result<u16, Error>;

    fn get_u32_checked(&mut self) -> Result<u32, Error>;

    fn get_u8_checked(&mut self) -> Result<u8, Error>;
}

fn need(buf: &Bytes, n: usize) -> Result<(), Error> {
    if buf.len() < n {
        return Err(err_protocol!(
            "packet too short: expected {} more bytes, found {}",
            n,
            buf.len()
        ));
    }

    Ok(())
}

impl MySqlBufExt for Bytes {
    fn get_uint_lenenc(&mut self) -> Result<Option<u64>, Error> {
        let first = self.get_u8_checked()?;

        Ok(Some(match first {
            0xfb => return Ok(None),

            0xfc => {
                need(self, 2)?;
                u64::from(self.get_u16_le())
            }

            0xfd => {
                need(self, 3)?;
                self.get_uint_le(3)
            }

            0xfe => {
                need(self, 8)?;
                self.get_u64_le()
            }

            0xff => return Err(err_protocol!("0xff is not a valid length-encoded integer")),

            v => u64::from(v),
        }))
    }

    fn get_str_lenenc(&mut self) -> Result<String, Error> {
        let bytes = self.get_bytes_lenenc()?;

        String::from_utf8(bytes.to_vec()).map_err(|err| err_protocol!("{}", err))
    }

    fn get_bytes_lenenc(&mut self) -> Result<Bytes, Error> {
        let size = self.get_uint_lenenc()?.unwrap_or(0);
        let size = usize::try_from(size)
            .map_err(|_| err_protocol!("string length overflows usize: {size}"))?;

        self.get_bytes(size)
    }

    fn get_u16_checked(&mut self) -> Result<u16, Error> {
        need(self, 2)?;
        Ok(self.get_u16_le())
    }

    fn get_u32_checked(&mut self) -> Result<u32, Error> {
        need(self, 4)?;
        Ok(self.get_u32_le())
    }

    fn get_u8_checked(&mut self) -> Result<u8, Error> {
        need(self, 1)?;
        Ok(self.get_u8())
    }
}
