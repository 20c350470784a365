use bytes::BufMut;

pub(crate) trait MySqlBufMutExt: BufMut {
    fn put_uint_lenenc(&mut self, v: u64);

    fn put_str_lenenc(&mut self, v: &str);

    fn put_bytes_lenenc(&mut self, v: &[u8]);
}

impl MySqlBufMutExt for Vec<u8> {
    fn put_uint_lenenc(&mut self, v: u64) {
        // https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_dt_integers.html
        // The 0xfb marker is NULL and is never written as a length
        let encoded_le = v.to_le_bytes();

        match v {
            0..=250 => self.push(encoded_le[0]),
            251..=0xff_ff => {
                self.push(0xfc);
                self.extend_from_slice(&encoded_le[..2]);
            }
            0x1_00_00..=0xff_ff_ff => {
                self.push(0xfd);
                self.extend_from_slice(&encoded_le[..3]);
            }
            _ => {
                self.push(0xfe);
                self.extend_from_slice(&encoded_le);
            }
        }
    }

    fn put_str_lenenc(&mut self, v: &str) {
        self.put_bytes_lenenc(v.as_bytes());
    }

    fn put_bytes_lenenc(&mut self, v: &[u8]) {
        self.put_uint_lenenc(v.len() as u64);
        self.extend_from_slice(v);
    }
}

/// Size of the length-encoded form of `v`.
pub(crate) fn lenenc_len(v: u64) -> usize {
    match v {
        0..=250 => 1,
        251..=0xff_ff => 3,
        0x1_00_00..=0xff_ff_ff => 4,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::io::MySqlBufExt;

    #[test]
    fn test_encodes_int_lenenc_tiers() {
        let cases: &[(u64, &[u8])] = &[
            (0, b"\x00"),
            (250, b"\xfa"),
            (251, b"\xfc\xfb\x00"),
            (0xff_ff, b"\xfc\xff\xff"),
            (0x1_00_00, b"\xfd\x00\x00\x01"),
            (0xff_ff_ff, b"\xfd\xff\xff\xff"),
            (0x1_00_00_00, b"\xfe\x00\x00\x00\x01\x00\x00\x00\x00"),
            (u64::MAX, b"\xfe\xff\xff\xff\xff\xff\xff\xff\xff"),
        ];

        for (value, expected) in cases {
            let mut buf = Vec::new();
            buf.put_uint_lenenc(*value);

            assert_eq!(&buf[..], *expected, "encoding {value}");
            assert_eq!(lenenc_len(*value), expected.len());
        }
    }

    #[test]
    fn test_lenenc_decodes_what_it_encodes() {
        use rand::Rng;

        let mut rng = rand::thread_rng();

        for shift in 0..64 {
            let value: u64 = rng.gen::<u64>() >> shift;

            let mut buf = Vec::new();
            buf.put_uint_lenenc(value);

            let mut bytes = Bytes::from(buf);
            assert_eq!(bytes.get_uint_lenenc().unwrap(), Some(value));
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn test_encodes_string_lenenc() {
        let mut buf = Vec::new();
        buf.put_str_lenenc("random_string");

        assert_eq!(&buf[..], b"\x0drandom_string");
    }
}
