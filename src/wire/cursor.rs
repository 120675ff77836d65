//! Sequential little-endian reader over a payload slice.
//!
//! Every read checks the remaining length first and reports an underrun as a
//! [`DecodeError`], so parsers can use `?` all the way down and never index
//! past the end of the buffer.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::DecodeError;

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
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

    /// Borrow the next `len` bytes and advance past them.
    pub fn raw(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Underrun {
                field,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.raw(N, field)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.raw(1, field)?[0])
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(LittleEndian::read_u16(self.raw(2, field)?))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u32(self.raw(4, field)?))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        Ok(LittleEndian::read_u64(self.raw(8, field)?))
    }

    /// CompactSize integer: one byte below 0xFD, otherwise a 0xFD/0xFE/0xFF
    /// prefix followed by a 2/4/8-byte little-endian value.
    pub fn read_var_int(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        match self.read_u8(field)? {
            0xFD => Ok(self.read_u16(field)? as u64),
            0xFE => Ok(self.read_u32(field)? as u64),
            0xFF => self.read_u64(field),
            n => Ok(n as u64),
        }
    }

    /// Read a var-int element count and reject it up front when `count`
    /// elements of at least `min_item_len` bytes cannot fit in what is left.
    pub fn read_count(
        &mut self,
        min_item_len: usize,
        field: &'static str,
    ) -> Result<usize, DecodeError> {
        let count = self.read_var_int(field)?;
        let remaining = self.remaining();
        let fits = (count as u128) * (min_item_len.max(1) as u128) <= remaining as u128;
        if !fits {
            return Err(DecodeError::LengthOverflow {
                field,
                count,
                remaining,
            });
        }
        Ok(count as usize)
    }

    /// Var-int length followed by that many raw bytes.
    pub fn read_var_bytes(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_count(1, field)?;
        self.raw(len, field)
    }

    /// Var-int length followed by text. Invalid UTF-8 is replaced rather than
    /// rejected; client strings in the wild are not always clean.
    pub fn read_var_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_var_bytes(field)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}
