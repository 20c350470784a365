use bytes::BufMut;

pub trait BufMutExt: BufMut {
    fn put_str_nul(&mut self, s: &str);

    fn put_bytes_nul(&mut self, bytes: &[u8]);
}

impl BufMutExt for Vec<u8> {
    fn put_str_nul(&mut self, s: &str) {
        self.put_bytes_nul(s.as_bytes());
    }

    fn put_bytes_nul(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
        self.push(0);
    }
}

#[test]
fn test_put_str_nul() {
    let mut buf = Vec::new();
    buf.put_str_nul("root");

    assert_eq!(&buf, b"root\0");
}
