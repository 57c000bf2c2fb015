use bytes::Bytes;

use super::DecodeError;

/// Bounds-checked reader over a request body. Every read either succeeds
/// within the buffer or returns a [`DecodeError`].
pub struct Cursor<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed,
            });
        }
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(raw))
    }

    /// `len` bytes as a zero-copy slice of the underlying buffer.
    pub fn read_length_prefixed(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        self.ensure(len)?;
        let slice = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    /// Read up to and including the next NUL.
    pub fn read_cstring(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        let nul = self.buf[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(DecodeError::MissingNul(start))?;
        self.pos = start + nul + 1;
        to_string(&self.buf[start..start + nul], start)
    }

    /// Read exactly `len` bytes that must end in NUL. The value stops at the
    /// first NUL, as a C reader would see it.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, DecodeError> {
        let start = self.pos;
        if len == 0 {
            return Err(DecodeError::MissingNul(start));
        }
        let raw = self.read_length_prefixed(len)?;
        if raw[len - 1] != 0 {
            return Err(DecodeError::MissingNul(start));
        }
        let end = raw.iter().position(|b| *b == 0).unwrap_or(len - 1);
        to_string(&raw[..end], start)
    }
}

fn to_string(raw: &[u8], offset: usize) -> Result<String, DecodeError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_past_end_are_rejected() {
        let buf = Bytes::from_static(&[1, 0, 0]);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(
            cursor.read_u32(),
            Err(DecodeError::Truncated {
                offset: 0,
                needed: 4
            })
        );
        assert!(cursor.read_length_prefixed(4).is_err());
        assert_eq!(cursor.read_length_prefixed(3).unwrap().as_ref(), &[1, 0, 0]);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_cstring() {
        let buf = Bytes::from_static(b"abc\0de");
        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_cstring().unwrap(), "abc");
        assert_eq!(cursor.read_cstring(), Err(DecodeError::MissingNul(4)));
    }

    #[test]
    fn test_fixed_string_requires_trailing_nul() {
        let buf = Bytes::from_static(b"abc\0abcd");
        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_fixed_string(4).unwrap(), "abc");
        assert_eq!(cursor.read_fixed_string(4), Err(DecodeError::MissingNul(4)));

        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_fixed_string(0), Err(DecodeError::MissingNul(0)));
    }
}
