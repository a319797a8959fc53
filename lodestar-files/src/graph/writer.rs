use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::common::writer::ByteWriter;

/// Produces object graph buffers as read by [`crate::graph::reader::GraphReader`].
///
/// Objects are written through closures, the length prefix is patched in once the
/// closure returned:
///
/// ```
/// use lodestar_files::graph::writer::GraphWriter;
///
/// let mut writer = GraphWriter::new();
/// writer.object(1, "Point", |w| {
///     w.property("x").f32(1.0);
///     w.property("y").f32(2.0);
/// });
/// let bytes = writer.into_bytes();
/// assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
/// ```
#[derive(Debug, Default)]
pub struct GraphWriter {
    writer: ByteWriter,
}

impl GraphWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_bytes()
    }

    /// Direct access for values without a dedicated helper.
    pub fn raw(&mut self) -> &mut ByteWriter {
        &mut self.writer
    }

    /// A referenced object that has not been written before.
    pub fn object(&mut self, id: u32, type_name: &str, body: impl FnOnce(&mut GraphWriter)) -> &mut Self {
        self.writer.write_u32(id);
        self.raw_object(type_name, body)
    }

    /// An object without id, as used by raw properties.
    pub fn raw_object(&mut self, type_name: &str, body: impl FnOnce(&mut GraphWriter)) -> &mut Self {
        let length_position = self.writer.position();
        self.writer.write_u32(0);
        self.writer.write_string_u16(type_name);
        body(self);
        let length = self.writer.position() - length_position - 4;
        self.writer.patch_u32(length_position, length as u32);
        self
    }

    /// A reference to an object that was (or is being) written already.
    pub fn reference(&mut self, id: u32) -> &mut Self {
        self.writer.write_u32(id);
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.reference(0)
    }

    pub fn list_header(&mut self, count: u32) -> &mut Self {
        self.writer.write_u32(count);
        self
    }

    pub fn property(&mut self, name: &str) -> &mut Self {
        self.writer.write_string_u16(name);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.writer.write_u8(value as u8);
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.writer.write_u8(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.writer.write_u16(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.writer.write_u32(value);
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.writer.write_f32(value);
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.writer.write_string_u16(value);
        self
    }

    pub fn vec2(&mut self, value: Vec2) -> &mut Self {
        self.writer.write_f32_slice(&value.to_array());
        self
    }

    pub fn vec3(&mut self, value: Vec3) -> &mut Self {
        self.writer.write_f32_slice(&value.to_array());
        self
    }

    pub fn vec4(&mut self, value: Vec4) -> &mut Self {
        self.writer.write_f32_slice(&value.to_array());
        self
    }

    pub fn quat(&mut self, value: Quat) -> &mut Self {
        self.writer.write_f32_slice(&value.to_array());
        self
    }

    pub fn mat4(&mut self, value: Mat4) -> &mut Self {
        self.writer.write_f32_slice(&value.to_cols_array());
        self
    }

    pub fn enum_map(&mut self, entries: &[(&str, i64)]) -> &mut Self {
        let encoded = entries
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        self.string(&encoded)
    }

    pub fn index_buffer(&mut self, indices: &[u32]) -> &mut Self {
        self.writer.write_u32(indices.len() as u32).write_u16(4);
        for index in indices {
            self.writer.write_u32(*index);
        }
        self
    }
}
