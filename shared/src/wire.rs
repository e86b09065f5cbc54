//! Little-endian cursor helpers for the query protocol's datagram layout.
//!
//! Strings on the wire are NUL-terminated and not guaranteed to be valid
//! UTF-8, so they are decoded lossily.

use crate::packet::CodecError;

/// Forward-only reader over a received datagram.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated(what));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u16(&mut self, what: &'static str) -> Result<u16, CodecError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Master server replies carry ports in network byte order.
    pub fn u16_be(&mut self, what: &'static str) -> Result<u16, CodecError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn i32(&mut self, what: &'static str) -> Result<i32, CodecError> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self, what: &'static str) -> Result<u64, CodecError> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn f32(&mut self, what: &'static str) -> Result<f32, CodecError> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        self.take(len, what)
    }

    pub fn cstring(&mut self, what: &'static str) -> Result<String, CodecError> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Truncated(what))?;
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(text)
    }
}

/// Append-only datagram builder.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u16_be(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn cstring(&mut self, v: &str) -> &mut Self {
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cstring_stops_at_nul() {
        let mut r = Reader::new(b"de_dust2\0rest\0");
        assert_eq!(r.cstring("map").unwrap(), "de_dust2");
        assert_eq!(r.cstring("next").unwrap(), "rest");
        assert!(r.is_empty());
    }

    #[test]
    fn test_unterminated_cstring_is_truncated() {
        let mut r = Reader::new(b"no terminator");
        assert!(matches!(r.cstring("name"), Err(CodecError::Truncated("name"))));
    }

    #[test]
    fn test_lossy_strings() {
        let mut r = Reader::new(&[0x66, 0xFF, 0x6F, 0x00]);
        assert_eq!(r.cstring("name").unwrap(), "f\u{FFFD}o");
    }

    #[test]
    fn test_short_read_reports_field() {
        let mut r = Reader::new(&[1, 2]);
        assert!(matches!(r.i32("score"), Err(CodecError::Truncated("score"))));
    }

    #[test]
    fn test_port_byte_orders() {
        let mut w = Writer::new();
        w.u16(27015).u16_be(27015);
        let data = w.finish();
        assert_eq!(&data, &[0x87, 0x69, 0x69, 0x87]);

        let mut r = Reader::new(&data);
        assert_eq!(r.u16("le").unwrap(), 27015);
        assert_eq!(r.u16_be("be").unwrap(), 27015);
    }
}
