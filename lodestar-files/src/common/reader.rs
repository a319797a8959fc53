use byteorder::{ByteOrder, LittleEndian};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::ParserError;

/// Forward reading cursor over an immutable byte buffer.
///
/// All multi-byte values are little endian. Every read either advances the cursor by exactly
/// the width of the value or fails with [`ParserError::TruncatedBuffer`] and leaves the position
/// untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// The whole underlying buffer, independent of the current position.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn seek(&mut self, position: usize) -> Result<(), ParserError> {
        if position > self.data.len() {
            return Err(ParserError::TruncatedBuffer {
                position,
                requested: 0,
                remaining: 0,
            });
        }

        self.position = position;
        Ok(())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ParserError> {
        if count > self.remaining() {
            return Err(ParserError::TruncatedBuffer {
                position: self.position,
                requested: count,
                remaining: self.remaining(),
            });
        }

        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParserError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParserError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParserError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ParserError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ParserError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ParserError> {
        self.take(count)
    }

    pub fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>, ParserError> {
        let bytes = self.take(count.checked_mul(4).ok_or_else(|| ParserError::format("array too large"))?)?;
        let mut list = vec![0; count];
        LittleEndian::read_u32_into(bytes, &mut list);
        Ok(list)
    }

    pub fn read_f32_array(&mut self, count: usize) -> Result<Vec<f32>, ParserError> {
        let bytes = self.take(count.checked_mul(4).ok_or_else(|| ParserError::format("array too large"))?)?;
        let mut list = vec![0.0; count];
        LittleEndian::read_f32_into(bytes, &mut list);
        Ok(list)
    }

    /// Reads a string prefixed with its byte length as u16.
    pub fn read_string_u16(&mut self) -> Result<String, ParserError> {
        let length = self.read_u16()? as usize;
        Ok(latin1_to_string(self.take(length)?))
    }

    /// Splits off the next `byte_length` bytes into an independent cursor and moves this one
    /// past them. Nested readers can therefore never run into the data that follows.
    pub fn slice(&mut self, byte_length: usize) -> Result<ByteCursor<'a>, ParserError> {
        Ok(ByteCursor::new(self.take(byte_length)?))
    }

    pub fn expect_end(&self, context: &'static str) -> Result<(), ParserError> {
        if !self.at_end() {
            return Err(ParserError::TrailingData {
                context,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Strings on the wire are single-byte encoded, every byte maps to the code point of the same value.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| byte as char).collect()
}

/// Looks up a NUL terminated string inside a string table. A missing terminator ends the
/// string at the end of the table.
pub fn read_cstring_at(table: &[u8], offset: usize) -> Result<String, ParserError> {
    let tail = table.get(offset..).ok_or(ParserError::TruncatedBuffer {
        position: offset,
        requested: 1,
        remaining: 0,
    })?;
    let end = tail.iter().position(|&c| c == 0).unwrap_or(tail.len());
    Ok(latin1_to_string(&tail[..end]))
}

/// Fixed layout values that know how to read themselves from a cursor. Struct and struct list
/// properties of the graph format are read through this, see `#[derive(Parse)]`.
pub trait Parseable<T> {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<T, ParserError>;
}

impl Parseable<u8> for u8 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<u8, ParserError> {
        rdr.read_u8()
    }
}

impl Parseable<bool> for bool {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<bool, ParserError> {
        Ok(rdr.read_u8()? != 0)
    }
}

impl Parseable<u16> for u16 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<u16, ParserError> {
        rdr.read_u16()
    }
}

impl Parseable<u32> for u32 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<u32, ParserError> {
        rdr.read_u32()
    }
}

impl Parseable<i32> for i32 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<i32, ParserError> {
        rdr.read_i32()
    }
}

impl Parseable<f32> for f32 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<f32, ParserError> {
        rdr.read_f32()
    }
}

impl Parseable<String> for String {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<String, ParserError> {
        rdr.read_string_u16()
    }
}

impl Parseable<Vec2> for Vec2 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<Vec2, ParserError> {
        Ok(Vec2::new(rdr.read_f32()?, rdr.read_f32()?))
    }
}

impl Parseable<Vec3> for Vec3 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<Vec3, ParserError> {
        Ok(Vec3::new(rdr.read_f32()?, rdr.read_f32()?, rdr.read_f32()?))
    }
}

impl Parseable<Vec4> for Vec4 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<Vec4, ParserError> {
        Ok(Vec4::new(
            rdr.read_f32()?,
            rdr.read_f32()?,
            rdr.read_f32()?,
            rdr.read_f32()?,
        ))
    }
}

impl Parseable<Quat> for Quat {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<Quat, ParserError> {
        Ok(Quat::from_xyzw(
            rdr.read_f32()?,
            rdr.read_f32()?,
            rdr.read_f32()?,
            rdr.read_f32()?,
        ))
    }
}

impl Parseable<Mat4> for Mat4 {
    fn parse(rdr: &mut ByteCursor<'_>) -> Result<Mat4, ParserError> {
        let mut cols = [0.0f32; 16];
        for value in cols.iter_mut() {
            *value = rdr.read_f32()?;
        }
        Ok(Mat4::from_cols_array(&cols))
    }
}
