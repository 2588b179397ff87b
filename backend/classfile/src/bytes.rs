//! Bounds-checked big-endian reader and writer helpers.

use crate::error::{ClassFileError, Result};

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ClassFileError::Truncated {
                offset: self.pos,
                needed: len,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }
}

pub trait ByteWriter {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);
    fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }
}

impl ByteWriter for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }
}

/// Checked conversion of a length to a `u16` count field.
pub fn u16_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ClassFileError::Malformed(format!("too many {what}: {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let mut r = ByteReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34]);
        assert_eq!(r.u32().unwrap(), 0xCAFEBABE);
        assert_eq!(r.u16().unwrap(), 0x34);
        assert!(r.is_empty());
    }

    #[test]
    fn test_truncated_read_is_an_error() {
        let mut r = ByteReader::new(&[0x01]);
        assert_eq!(
            r.u16().unwrap_err(),
            ClassFileError::Truncated { offset: 0, needed: 2 }
        );
    }

    #[test]
    fn test_writer_round_trip() {
        let mut out = Vec::new();
        out.put_u16(0xBEEF);
        out.put_i32(-2);
        let mut r = ByteReader::new(&out);
        assert_eq!(r.u16().unwrap(), 0xBEEF);
        assert_eq!(r.i32().unwrap(), -2);
    }
}
