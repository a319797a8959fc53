use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::sync::{Arc, RwLock};

use log::trace;
use num_enum::TryFromPrimitive;

use crate::ParserError;
use crate::common::reader::read_cstring_at;
use crate::effect::reader::VariantReader;

/// Where a compiled variant starts inside the effect buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConstantBufferSlot {
    pub index: u32,
    pub offset: u32,
    pub size: u32,
}

/// A named axis of shader variation, e.g. `Quality: {Low, High}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    pub name: String,
    pub options: Vec<String>,
    pub default_option: u8,
}

impl Permutation {
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    pub fn option_index(&self, label: &str) -> Result<usize, ParserError> {
        self.options
            .iter()
            .position(|option| option == label)
            .ok_or_else(|| ParserError::InvalidPermutationOption {
                permutation: self.name.clone(),
                option: label.to_string(),
            })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum StageType {
    Vertex = 0,
    Fragment = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderConstant {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub constant_type: u8,
    pub elements: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderTexture {
    pub register: u8,
    pub name: String,
    pub texture_type: u8,
    pub is_srgb: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSampler {
    pub register: u8,
    /// Empty for effect versions before 4, which don't store sampler names.
    pub name: String,
    pub min_filter: u8,
    pub mag_filter: u8,
    pub mip_filter: u8,
    pub address_u: u8,
    pub address_v: u8,
    pub address_w: u8,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u8,
    pub comparison: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStage {
    pub stage_type: StageType,
    /// Byte range of the compiled code inside the effect buffer, see [`EffectFile::code`].
    pub code: Range<usize>,
    pub constants: Vec<ShaderConstant>,
    pub constant_values: Vec<f32>,
    pub textures: Vec<ShaderTexture>,
    pub samplers: Vec<ShaderSampler>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub state: u32,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderPass {
    pub stages: Vec<ShaderStage>,
    pub states: Vec<RenderState>,
}

impl ShaderPass {
    pub fn has_constant(&self, name: &str) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.constants.iter().any(|constant| constant.name == name))
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.textures.iter().any(|texture| texture.name == name))
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.samplers.iter().any(|sampler| sampler.name == name))
    }

    /// Names of the constants and textures a material may set on this pass.
    pub fn parameter_names(&self, out: &mut BTreeSet<String>) {
        for stage in &self.stages {
            out.extend(stage.constants.iter().map(|constant| constant.name.clone()));
            out.extend(stage.textures.iter().map(|texture| texture.name.clone()));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTechnique {
    pub name: String,
    pub passes: Vec<ShaderPass>,
}

impl ShaderTechnique {
    pub fn has_constant(&self, name: &str) -> bool {
        self.passes.iter().any(|pass| pass.has_constant(name))
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.passes.iter().any(|pass| pass.has_texture(name))
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.passes.iter().any(|pass| pass.has_sampler(name))
    }

    pub fn parameter_names(&self, out: &mut BTreeSet<String>) {
        for pass in &self.passes {
            pass.parameter_names(out);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AnnotationKind {
    Bool = 0,
    Int = 1,
    Float = 2,
    String = 3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
}

/// Tool metadata attached to a parameter, e.g. its UI group or range.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderAnnotation {
    pub name: String,
    pub entries: Vec<(String, AnnotationValue)>,
}

impl ShaderAnnotation {
    pub fn get(&self, key: &str) -> Option<&AnnotationValue> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == key)
            .map(|(_, value)| value)
    }
}

/// One compiled combination of permutation options.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderVariant {
    pub index: u32,
    pub techniques: BTreeMap<String, ShaderTechnique>,
    pub annotations: BTreeMap<String, ShaderAnnotation>,
}

impl ShaderVariant {
    pub fn technique(&self, name: &str) -> Option<&ShaderTechnique> {
        self.techniques.get(name)
    }

    pub fn has_constant(&self, name: &str) -> bool {
        self.techniques.values().any(|technique| technique.has_constant(name))
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.techniques.values().any(|technique| technique.has_texture(name))
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.techniques.values().any(|technique| technique.has_sampler(name))
    }

    pub fn parameter_names(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for technique in self.techniques.values() {
            technique.parameter_names(&mut out);
        }
        out
    }
}

/// A decoded effect header. Variants are only decoded when they are asked for and are kept
/// until the file is dropped.
#[derive(Debug)]
pub struct EffectFile {
    pub(crate) data: Vec<u8>,
    pub(crate) version: u32,
    pub(crate) string_table: Range<usize>,
    pub(crate) permutations: Vec<Permutation>,
    pub(crate) offsets: Vec<ConstantBufferSlot>,
    pub(crate) technique_section: usize,
    pub(crate) variants: RwLock<HashMap<u32, Arc<ShaderVariant>>>,
}

impl EffectFile {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn string_table(&self) -> &[u8] {
        &self.data[self.string_table.clone()]
    }

    pub fn read_string(&self, offset: u32) -> Result<String, ParserError> {
        read_cstring_at(self.string_table(), offset as usize)
    }

    pub fn permutations(&self) -> &[Permutation] {
        &self.permutations
    }

    pub fn offsets(&self) -> &[ConstantBufferSlot] {
        &self.offsets
    }

    /// Start of the technique section as recorded in the header (0 for legacy files).
    pub fn technique_section(&self) -> usize {
        self.technique_section
    }

    /// Compiled code of a stage.
    pub fn code(&self, stage: &ShaderStage) -> &[u8] {
        &self.data[stage.code.clone()]
    }

    /// Number of distinct option combinations, `None` if it doesn't fit into an u64.
    pub fn variant_count(&self) -> Option<u64> {
        self.permutations
            .iter()
            .try_fold(1u64, |count, permutation| count.checked_mul(permutation.option_count() as u64))
    }

    /// Mixed radix index of an option selection, the first permutation is the least significant
    /// digit. Permutations the caller doesn't mention use their default option, names that are
    /// no permutation of this effect are ignored.
    pub fn variant_index(&self, options: &HashMap<String, String>) -> Result<u32, ParserError> {
        let mut index = 0u64;
        let mut multiplier = 1u64;

        for (position, permutation) in self.permutations.iter().enumerate() {
            let value = match options.get(&permutation.name) {
                Some(label) => permutation.option_index(label)? as u64,
                None => permutation.default_option as u64,
            };

            index = value
                .checked_mul(multiplier)
                .and_then(|digit| index.checked_add(digit))
                .ok_or_else(|| ParserError::format("variant index overflows"))?;
            if position + 1 == self.permutations.len() {
                break;
            }
            multiplier = multiplier
                .checked_mul(permutation.option_count() as u64)
                .ok_or_else(|| ParserError::format("variant count overflows"))?;
        }

        u32::try_from(index).map_err(|_| ParserError::format("variant index overflows"))
    }

    /// Returns the variant for an option selection, decoding it on first use. A failed decode
    /// is not cached, the next call tries again.
    pub fn variant(&self, options: &HashMap<String, String>) -> Result<Arc<ShaderVariant>, ParserError> {
        let index = self.variant_index(options)?;
        self.variant_by_index(index)
    }

    pub fn variant_by_index(&self, index: u32) -> Result<Arc<ShaderVariant>, ParserError> {
        if let Some(variant) = self
            .variants
            .read()
            .expect("Variant cache read lock")
            .get(&index)
        {
            return Ok(variant.clone());
        }

        let variant = Arc::new(VariantReader::new(self).read_variant(index)?);
        trace!("Decoded shader variant {}", index);

        // Another thread may have decoded the same variant meanwhile, keep the first one.
        let mut variants = self.variants.write().expect("Variant cache write lock");
        Ok(variants.entry(index).or_insert(variant).clone())
    }

    pub fn cached_variant_count(&self) -> usize {
        self.variants.read().expect("Variant cache read lock").len()
    }
}
