use byteorder::{ByteOrder, LittleEndian};

/// Little endian byte sink, the counterpart to [`crate::common::reader::ByteCursor`].
/// Used by tooling and tests to produce graph and effect buffers.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        let mut bytes = [0; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.write_bytes(&bytes)
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        let mut bytes = [0; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.write_bytes(&bytes)
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        let mut bytes = [0; 4];
        LittleEndian::write_i32(&mut bytes, value);
        self.write_bytes(&bytes)
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        let mut bytes = [0; 4];
        LittleEndian::write_f32(&mut bytes, value);
        self.write_bytes(&bytes)
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) -> &mut Self {
        for value in values {
            self.write_f32(*value);
        }
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Writes a u16 length prefixed, single-byte encoded string. Characters outside of
    /// Latin-1 are replaced by `?`.
    pub fn write_string_u16(&mut self, value: &str) -> &mut Self {
        let bytes = string_to_latin1(value);
        self.write_u16(bytes.len() as u16);
        self.write_bytes(&bytes)
    }

    /// Overwrites a previously written u32, e.g. a length prefix that is only known afterwards.
    pub fn patch_u32(&mut self, position: usize, value: u32) -> &mut Self {
        LittleEndian::write_u32(&mut self.buf[position..position + 4], value);
        self
    }
}

pub fn string_to_latin1(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
