use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use log::{trace, warn};

use crate::ParserError;
use crate::common::reader::{ByteCursor, read_cstring_at};
use crate::effect::types::{
    AnnotationKind, AnnotationValue, ConstantBufferSlot, EffectFile, Permutation, RenderState, ShaderAnnotation,
    ShaderConstant, ShaderPass, ShaderSampler, ShaderStage, ShaderTechnique, ShaderTexture, ShaderVariant, StageType,
};

pub const MIN_VERSION: u32 = 2;
pub const MAX_VERSION: u32 = 8;
/// First version with a leading string table, permutations and an offset table.
pub const PERMUTATION_VERSION: u32 = 5;

pub struct EffectReader {}

impl EffectReader {
    /// Reads the effect header. Shader variants are decoded lazily through [`EffectFile::variant`].
    pub fn parse_effect(data: Vec<u8>) -> Result<EffectFile, ParserError> {
        let mut rdr = ByteCursor::new(&data);
        let version = rdr.read_u32()?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(ParserError::UnsupportedVersion { version });
        }

        let header = if version < PERMUTATION_VERSION {
            EffectReader::read_legacy_header(&mut rdr)?
        } else {
            EffectReader::read_header(&mut rdr)?
        };

        let file = EffectFile {
            version,
            string_table: header.string_table,
            permutations: header.permutations,
            offsets: header.offsets,
            technique_section: header.technique_section,
            variants: RwLock::new(HashMap::new()),
            data,
        };

        match file.variant_count() {
            Some(count) if count == file.offsets.len() as u64 => {}
            count => warn!(
                "Effect declares {:?} variants but has {} offsets",
                count,
                file.offsets.len()
            ),
        }

        trace!(
            "Read effect v{} with {} permutations and {} offsets",
            version,
            file.permutations.len(),
            file.offsets.len()
        );
        Ok(file)
    }

    /// `u32 headerSize | u32 permutationIndex | u32 offset | ...`, the string table follows the
    /// header block of `headerSize` triples, which begins right after the version.
    fn read_legacy_header(rdr: &mut ByteCursor<'_>) -> Result<Header, ParserError> {
        let header_size = rdr.read_u32()?;
        if header_size == 0 {
            return Err(ParserError::EmptyEffect);
        }

        let _permutation_index = rdr.read_u32()?;
        let offset = rdr.read_u32()?;

        let string_table_position = (header_size as usize)
            .checked_mul(12)
            .and_then(|size| size.checked_add(8))
            .ok_or_else(|| ParserError::format("effect header size overflows"))?;
        rdr.seek(string_table_position)?;
        let string_table = EffectReader::read_string_table(rdr)?;

        Ok(Header {
            string_table,
            permutations: Vec::new(),
            offsets: vec![ConstantBufferSlot {
                index: 0,
                offset,
                size: 0,
            }],
            technique_section: 0,
        })
    }

    fn read_header(rdr: &mut ByteCursor<'_>) -> Result<Header, ParserError> {
        let string_table = EffectReader::read_string_table(rdr)?;
        let table = &rdr.data()[string_table.clone()];

        let permutation_count = rdr.read_u8()?;
        let mut permutations = Vec::with_capacity(permutation_count as usize);
        for _ in 0..permutation_count {
            permutations.push(EffectReader::read_permutation(rdr, table)?);
        }

        let header_size = rdr.read_u32()?;
        if header_size == 0 {
            return Err(ParserError::EmptyEffect);
        }

        let mut offsets = Vec::with_capacity(header_size.min(4096) as usize);
        for _ in 0..header_size {
            offsets.push(ConstantBufferSlot {
                index: rdr.read_u32()?,
                offset: rdr.read_u32()?,
                size: rdr.read_u32()?,
            });
        }

        let _reserved = rdr.read_u32()?;
        let technique_section = rdr.read_u32()? as usize;
        rdr.seek(technique_section)?;

        Ok(Header {
            string_table,
            permutations,
            offsets,
            technique_section,
        })
    }

    fn read_string_table(rdr: &mut ByteCursor<'_>) -> Result<std::ops::Range<usize>, ParserError> {
        let size = rdr.read_u32()? as usize;
        let start = rdr.position();
        rdr.read_bytes(size)?;
        Ok(start..start + size)
    }

    /// `u32 nameOffset | u8 defaultOption | u8 optionCount | optionCount * u32 labelOffset`
    fn read_permutation(rdr: &mut ByteCursor<'_>, table: &[u8]) -> Result<Permutation, ParserError> {
        let name = read_cstring_at(table, rdr.read_u32()? as usize)?;
        let default_option = rdr.read_u8()?;
        let option_count = rdr.read_u8()?;
        if option_count == 0 {
            return Err(ParserError::format(format!("permutation {name} has no options")));
        }
        if default_option >= option_count {
            return Err(ParserError::format(format!(
                "default option {default_option} of permutation {name} is out of range"
            )));
        }

        let options = (0..option_count)
            .map(|_| read_cstring_at(table, rdr.read_u32()? as usize))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Permutation {
            name,
            options,
            default_option,
        })
    }
}

struct Header {
    string_table: std::ops::Range<usize>,
    permutations: Vec<Permutation>,
    offsets: Vec<ConstantBufferSlot>,
    technique_section: usize,
}

/// Decodes one shader variant from the effect buffer.
pub(crate) struct VariantReader<'a> {
    file: &'a EffectFile,
    rdr: ByteCursor<'a>,
}

impl<'a> VariantReader<'a> {
    pub(crate) fn new(file: &'a EffectFile) -> Self {
        Self {
            file,
            rdr: ByteCursor::new(&file.data),
        }
    }

    // Offset table rows are addressed by their position, not by their index column.
    pub(crate) fn read_variant(mut self, index: u32) -> Result<ShaderVariant, ParserError> {
        let slot = self
            .file
            .offsets
            .get(index as usize)
            .ok_or_else(|| ParserError::format(format!("no offset recorded for variant {index}")))?;
        self.rdr.seek(slot.offset as usize)?;

        let version = self.file.version;
        let technique_count = if version > 6 { self.rdr.read_u8()? } else { 1 };
        let mut techniques = BTreeMap::new();
        for _ in 0..technique_count {
            let name = if version > 6 {
                self.read_string()?
            } else {
                "Main".to_string()
            };
            if techniques.contains_key(&name) {
                return Err(ParserError::format(format!("technique {name} is already defined")));
            }

            let technique = self.read_technique(name.clone())?;
            techniques.insert(name, technique);
        }

        let annotation_count = self.rdr.read_u16()?;
        let mut annotations = BTreeMap::new();
        for _ in 0..annotation_count {
            let annotation = self.read_annotation()?;
            annotations.insert(annotation.name.clone(), annotation);
        }

        Ok(ShaderVariant {
            index,
            techniques,
            annotations,
        })
    }

    fn read_string(&mut self) -> Result<String, ParserError> {
        let offset = self.rdr.read_u32()?;
        self.file.read_string(offset)
    }

    fn read_technique(&mut self, name: String) -> Result<ShaderTechnique, ParserError> {
        let pass_count = self.rdr.read_u8()?;
        let passes = (0..pass_count)
            .map(|_| self.read_pass())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ShaderTechnique { name, passes })
    }

    fn read_pass(&mut self) -> Result<ShaderPass, ParserError> {
        let stage_count = self.rdr.read_u8()?;
        let stages = (0..stage_count)
            .map(|_| self.read_stage())
            .collect::<Result<Vec<_>, _>>()?;

        let state_count = self.rdr.read_u8()?;
        let mut states = Vec::with_capacity(state_count as usize);
        for _ in 0..state_count {
            states.push(RenderState {
                state: self.rdr.read_u32()?,
                value: self.rdr.read_u32()?,
            });
        }

        Ok(ShaderPass { stages, states })
    }

    fn read_stage(&mut self) -> Result<ShaderStage, ParserError> {
        let raw_type = self.rdr.read_u8()?;
        let stage_type = StageType::try_from(raw_type)
            .map_err(|_| ParserError::format(format!("unknown shader stage type {raw_type}")))?;

        let code_size = self.rdr.read_u32()? as usize;
        let code_start = self.rdr.position();
        self.rdr.read_bytes(code_size)?;

        let constant_count = self.rdr.read_u32()?;
        let mut constants = Vec::with_capacity(constant_count.min(1024) as usize);
        for _ in 0..constant_count {
            constants.push(ShaderConstant {
                name: self.read_string()?,
                offset: self.rdr.read_u32()?,
                size: self.rdr.read_u32()?,
                constant_type: self.rdr.read_u8()?,
                elements: self.rdr.read_u32()?,
            });
        }

        let value_count = self.rdr.read_u32()? as usize;
        let constant_values = self.rdr.read_f32_array(value_count)?;

        let texture_count = self.rdr.read_u8()?;
        let mut textures = Vec::with_capacity(texture_count as usize);
        for _ in 0..texture_count {
            textures.push(ShaderTexture {
                register: self.rdr.read_u8()?,
                name: self.read_string()?,
                texture_type: self.rdr.read_u8()?,
                is_srgb: self.rdr.read_u8()? != 0,
            });
        }

        let sampler_count = self.rdr.read_u8()?;
        let mut samplers = Vec::with_capacity(sampler_count as usize);
        for _ in 0..sampler_count {
            samplers.push(self.read_sampler()?);
        }

        Ok(ShaderStage {
            stage_type,
            code: code_start..code_start + code_size,
            constants,
            constant_values,
            textures,
            samplers,
        })
    }

    fn read_sampler(&mut self) -> Result<ShaderSampler, ParserError> {
        let register = self.rdr.read_u8()?;
        let name = if self.file.version >= 4 {
            self.read_string()?
        } else {
            String::new()
        };

        Ok(ShaderSampler {
            register,
            name,
            min_filter: self.rdr.read_u8()?,
            mag_filter: self.rdr.read_u8()?,
            mip_filter: self.rdr.read_u8()?,
            address_u: self.rdr.read_u8()?,
            address_v: self.rdr.read_u8()?,
            address_w: self.rdr.read_u8()?,
            mip_lod_bias: self.rdr.read_f32()?,
            max_anisotropy: self.rdr.read_u8()?,
            comparison: self.rdr.read_u8()?,
        })
    }

    fn read_annotation(&mut self) -> Result<ShaderAnnotation, ParserError> {
        let name = self.read_string()?;
        let entry_count = self.rdr.read_u8()?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let key = self.read_string()?;
            let raw_kind = self.rdr.read_u8()?;
            let kind = AnnotationKind::try_from(raw_kind)
                .map_err(|_| ParserError::format(format!("unknown annotation kind {raw_kind} for {name}.{key}")))?;

            let value = match kind {
                AnnotationKind::Bool => AnnotationValue::Bool(self.rdr.read_u32()? != 0),
                AnnotationKind::Int => AnnotationValue::Int(self.rdr.read_i32()?),
                AnnotationKind::Float => AnnotationValue::Float(self.rdr.read_f32()?),
                AnnotationKind::String => AnnotationValue::String(self.read_string()?),
            };
            entries.push((key, value));
        }

        Ok(ShaderAnnotation { name, entries })
    }
}
