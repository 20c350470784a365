use bytes::{Buf, Bytes};
use memchr::memchr;

use crate::error::Error;

pub trait BufExt: Buf {
    // Read a nul-terminated byte sequence
    fn get_bytes_nul(&mut self) -> Result<Bytes, Error>;

    // Read a byte sequence of the exact length
    fn get_bytes(&mut self, len: usize) -> Result<Bytes, Error>;

    // Read a nul-terminated string
    fn get_str_nul(&mut self) -> Result<String, Error>;

    // Read a string of the exact length
    fn get_str(&mut self, len: usize) -> Result<String, Error>;

    // Read the remainder of the buffer, dropping a single trailing NUL if one is present
    fn get_bytes_eof(&mut self) -> Bytes;
}

impl BufExt for Bytes {
    fn get_bytes_nul(&mut self) -> Result<Bytes, Error> {
        let nul =
            memchr(b'\0', self).ok_or_else(|| err_protocol!("expected NUL in byte sequence"))?;

        let v = self.slice(0..nul);

        self.advance(nul + 1);

        Ok(v)
    }

    fn get_bytes(&mut self, len: usize) -> Result<Bytes, Error> {
        if self.len() < len {
            return Err(err_protocol!(
                "expected {} bytes but only {} remain in packet",
                len,
                self.len()
            ));
        }

        Ok(self.split_to(len))
    }

    fn get_str_nul(&mut self) -> Result<String, Error> {
        self.get_bytes_nul().and_then(|bytes| {
            String::from_utf8(bytes.to_vec())
                .map_err(|err| err_protocol!("{}", err))
        })
    }

    fn get_str(&mut self, len: usize) -> Result<String, Error> {
        let v = self.get_bytes(len)?;

        String::from_utf8(v.to_vec()).map_err(|err| err_protocol!("{}", err))
    }

    fn get_bytes_eof(&mut self) -> Bytes {
        let mut rest = self.split_to(self.len());

        if rest.last() == Some(&0) {
            rest.truncate(rest.len() - 1);
        }

        rest
    }
}
