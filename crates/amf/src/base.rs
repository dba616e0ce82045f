//! Fixed-width primitives shared by both encodings.
//!
//! Everything multi-byte is big-endian on the wire. Floats are assembled one
//! byte at a time so the result never depends on the host byte order.

use std::io;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use crate::{AmfReadError, AmfWriteError};

/// A bounds-checked cursor over a [`Bytes`] buffer.
///
/// Every read checks the remaining length first, so a truncated buffer fails
/// with [`AmfReadError::OutOfBounds`] instead of a short read. Byte slices are
/// extracted without copying.
#[derive(Debug, Clone, Default)]
pub struct ByteReader {
    cursor: io::Cursor<Bytes>,
}

impl ByteReader {
    /// Create a new reader positioned at the start of `buffer`.
    pub fn new(buffer: Bytes) -> Self {
        Self {
            cursor: io::Cursor::new(buffer),
        }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.cursor
            .get_ref()
            .len()
            .saturating_sub(self.position())
    }

    /// Check if every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the underlying buffer.
    pub fn into_inner(self) -> Bytes {
        self.cursor.into_inner()
    }

    fn ensure(&self, needed: usize) -> Result<(), AmfReadError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(AmfReadError::OutOfBounds { needed, remaining });
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], AmfReadError> {
        self.ensure(N)?;
        let mut buf = [0; N];
        io::Read::read_exact(&mut self.cursor, &mut buf)?;
        Ok(buf)
    }

    /// Peek at the next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8, AmfReadError> {
        self.ensure(1)?;
        Ok(self.cursor.get_ref()[self.position()])
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, AmfReadError> {
        self.ensure(1)?;
        Ok(self.cursor.read_u8()?)
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, AmfReadError> {
        self.ensure(2)?;
        Ok(self.cursor.read_u16::<BigEndian>()?)
    }

    /// Read a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, AmfReadError> {
        self.ensure(2)?;
        Ok(self.cursor.read_i16::<BigEndian>()?)
    }

    /// Read a big-endian 24-bit integer.
    pub fn read_u24(&mut self) -> Result<u32, AmfReadError> {
        self.ensure(3)?;
        Ok(self.cursor.read_u24::<BigEndian>()?)
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, AmfReadError> {
        self.ensure(4)?;
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    /// Read a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, AmfReadError> {
        self.ensure(4)?;
        Ok(self.cursor.read_i32::<BigEndian>()?)
    }

    /// The one little-endian field: used by records that carry a host-order length.
    pub fn read_i32_le(&mut self) -> Result<i32, AmfReadError> {
        self.ensure(4)?;
        Ok(self.cursor.read_i32::<LittleEndian>()?)
    }

    /// Read an IEEE-754 double, most significant byte first.
    pub fn read_f64(&mut self) -> Result<f64, AmfReadError> {
        let b = self.read_array::<8>()?;
        let bits = b.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
        Ok(f64::from_bits(bits))
    }

    /// Read an IEEE-754 single, most significant byte first.
    pub fn read_f32(&mut self) -> Result<f32, AmfReadError> {
        let b = self.read_array::<4>()?;
        let bits = (b[0] as u32) << 24 | (b[1] as u32) << 16 | (b[2] as u32) << 8 | b[3] as u32;
        Ok(f32::from_bits(bits))
    }

    /// Extracts `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, AmfReadError> {
        self.ensure(len)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let position = self.position();
        // O(1): only the reference count is touched.
        let slice = self.cursor.get_ref().slice(position..position + len);
        self.cursor.set_position((position + len) as u64);
        Ok(slice)
    }

    /// Read a UTF-8 string whose length is known by the caller.
    pub fn read_utf8(&mut self, len: usize) -> Result<String, AmfReadError> {
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(&bytes)?.to_owned())
    }

    /// Read a UTF-8 string with a 16-bit length prefix.
    pub fn read_utf8_u16(&mut self) -> Result<String, AmfReadError> {
        let len = self.read_u16()?;
        self.read_utf8(len as usize)
    }
}

/// Write-side mirror of [`ByteReader`] for [`BytesMut`].
pub trait AmfBufMut {
    /// Write a 24-bit big-endian integer.
    fn put_u24(&mut self, value: u32);
    /// Write a double most significant byte first.
    fn put_f64_be(&mut self, value: f64);
    /// Write a single most significant byte first.
    fn put_f32_be(&mut self, value: f32);
    /// Write a UTF-8 string with a 16-bit length prefix.
    fn put_utf8_u16(&mut self, value: &str) -> Result<(), AmfWriteError>;
}

impl AmfBufMut for BytesMut {
    fn put_u24(&mut self, value: u32) {
        self.put_uint(value as u64 & 0x00FF_FFFF, 3);
    }

    fn put_f64_be(&mut self, value: f64) {
        let bits = value.to_bits();
        for shift in (0..8).rev() {
            self.put_u8((bits >> (shift * 8)) as u8);
        }
    }

    fn put_f32_be(&mut self, value: f32) {
        let bits = value.to_bits();
        self.put_slice(&[(bits >> 24) as u8, (bits >> 16) as u8, (bits >> 8) as u8, bits as u8]);
    }

    fn put_utf8_u16(&mut self, value: &str) -> Result<(), AmfWriteError> {
        if value.len() > u16::MAX as usize {
            return Err(AmfWriteError::KeyTooLong(value.len()));
        }
        self.put_u16(value.len() as u16);
        self.put_slice(value.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers_big_endian() {
        let mut reader = ByteReader::new(Bytes::from_static(&[
            0x7f, // u8
            0x01, 0x02, // u16
            0xff, 0xfe, // i16
            0x01, 0x02, 0x03, // u24
            0xde, 0xad, 0xbe, 0xef, // u32
            0xff, 0xff, 0xff, 0xfd, // i32
            0x01, 0x00, 0x00, 0x00, // i32 le
        ]));

        assert_eq!(reader.read_u8().unwrap(), 0x7f);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_u24().unwrap(), 0x010203);
        assert_eq!(reader.read_u32().unwrap(), 0xdeadbeef);
        assert_eq!(reader.read_i32().unwrap(), -3);
        assert_eq!(reader.read_i32_le().unwrap(), 1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_floats() {
        let mut data = Vec::new();
        data.extend_from_slice(&772.161_f64.to_be_bytes());
        data.extend_from_slice(&(-1.5_f32).to_be_bytes());

        let mut reader = ByteReader::new(Bytes::from(data));
        assert_eq!(reader.read_f64().unwrap(), 772.161);
        assert_eq!(reader.read_f32().unwrap(), -1.5);
    }

    #[test]
    fn test_write_floats_match_std_big_endian() {
        let mut buf = BytesMut::new();
        buf.put_f64_be(772.161);
        buf.put_f32_be(3.25);
        buf.put_u24(0xabcdef);

        let mut expected = Vec::new();
        expected.extend_from_slice(&772.161_f64.to_be_bytes());
        expected.extend_from_slice(&3.25_f32.to_be_bytes());
        expected.extend_from_slice(&[0xab, 0xcd, 0xef]);
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut reader = ByteReader::new(Bytes::from_static(&[0x00, 0x01, 0x02]));
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            AmfReadError::OutOfBounds {
                needed: 4,
                remaining: 3
            }
        ));
        // A failed read consumes nothing.
        assert_eq!(reader.position(), 0);
        assert!(matches!(
            reader.read_f64(),
            Err(AmfReadError::OutOfBounds { needed: 8, .. })
        ));
    }

    #[test]
    fn test_read_utf8_u16() {
        let mut data = vec![0x00, 0x0b];
        data.extend_from_slice(b"Hello World");
        let mut reader = ByteReader::new(Bytes::from(data));
        assert_eq!(reader.read_utf8_u16().unwrap(), "Hello World");

        let mut reader = ByteReader::new(Bytes::from_static(&[0x00, 0x05, b'a', b'b']));
        assert!(matches!(
            reader.read_utf8_u16(),
            Err(AmfReadError::OutOfBounds {
                needed: 5,
                remaining: 2
            })
        ));

        let mut reader = ByteReader::new(Bytes::from_static(&[0x00, 0x02, 0xff, 0xff]));
        assert!(matches!(
            reader.read_utf8_u16(),
            Err(AmfReadError::StringParseError(_))
        ));
    }

    #[test]
    fn test_read_bytes_zero_copy() {
        let buffer = Bytes::from_static(&[1, 2, 3, 4, 5]);
        let mut reader = ByteReader::new(buffer.clone());
        let slice = reader.read_bytes(3).unwrap();
        assert_eq!(slice, Bytes::from_static(&[1, 2, 3]));
        assert_eq!(slice.as_ptr(), buffer.as_ptr());
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.read_bytes(0).unwrap(), Bytes::new());
        assert!(reader.read_bytes(3).is_err());
        assert_eq!(reader.peek_u8().unwrap(), 4);
    }

    #[test]
    fn test_put_utf8_u16_too_long() {
        let mut buf = BytesMut::new();
        let long = "a".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            buf.put_utf8_u16(&long),
            Err(AmfWriteError::KeyTooLong(65536))
        ));

        buf.put_utf8_u16("test").unwrap();
        assert_eq!(&buf[..], &[0x00, 0x04, b't', b'e', b's', b't']);
    }
}
