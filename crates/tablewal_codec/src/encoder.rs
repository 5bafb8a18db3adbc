//! Binary encoder and size arithmetic.
//!
//! Every length computed here matches the bytes [`Encoder`] produces exactly;
//! entry splitting depends on it.

/// Maximum number of bytes a LEB128 `u64` can occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `value` occupies as an unsigned LEB128 varint.
#[must_use]
pub const fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Size of a length-prefixed field whose payload is `len` bytes.
#[must_use]
pub const fn delimited_len(len: usize) -> usize {
    varint_len(len as u64) + len
}

#[allow(clippy::cast_sign_loss)]
pub(crate) const fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[allow(clippy::cast_possible_wrap)]
pub(crate) const fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Appends encoded fields to a caller-owned buffer.
pub struct Encoder<'a> {
    buffer: &'a mut Vec<u8>,
}

impl<'a> Encoder<'a> {
    /// Create an encoder writing to the end of `buffer`.
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self { buffer }
    }

    /// Write a single byte.
    pub fn put_u8(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Write an unsigned LEB128 varint.
    #[allow(clippy::cast_possible_truncation)]
    pub fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buffer.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    /// Write a signed integer using zigzag varint encoding.
    pub fn put_signed(&mut self, value: i64) {
        self.put_varint(zigzag(value));
    }

    /// Write a little-endian `f64`.
    pub fn put_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-prefixed byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as u64);
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Number of bytes in the underlying buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_varint(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).put_varint(value);
        buf
    }

    #[test]
    fn varint_boundaries() {
        assert_eq!(encoded_varint(0), vec![0x00]);
        assert_eq!(encoded_varint(127), vec![0x7f]);
        assert_eq!(encoded_varint(128), vec![0x80, 0x01]);
        assert_eq!(encoded_varint(300), vec![0xac, 0x02]);
    }

    #[test]
    fn varint_len_matches_encoding() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            assert_eq!(varint_len(value), encoded_varint(value).len(), "value {value}");
        }
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
    }

    #[test]
    fn zigzag_roundtrip() {
        for n in [0i64, -1, 1, -64, 64, i64::MIN, i64::MAX] {
            assert_eq!(unzigzag(zigzag(n)), n);
        }
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
    }

    #[test]
    fn delimited_len_counts_prefix() {
        assert_eq!(delimited_len(0), 1);
        assert_eq!(delimited_len(127), 128);
        assert_eq!(delimited_len(128), 130);
    }
}
