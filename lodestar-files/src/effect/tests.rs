use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ParserError;
use crate::common::writer::ByteWriter;
use crate::effect::reader::EffectReader;
use crate::effect::types::{AnnotationValue, StageType};

#[derive(Default)]
struct Strings {
    table: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Strings {
    fn add(&mut self, value: &str) {
        if !self.offsets.contains_key(value) {
            self.offsets.insert(value.to_string(), self.table.len() as u32);
            self.table.extend_from_slice(value.as_bytes());
            self.table.push(0);
        }
    }

    fn get(&self, value: &str) -> u32 {
        self.offsets[value]
    }
}

type PermutationDecl<'a> = (&'a str, u8, &'a [&'a str]);

fn strings_for(permutations: &[PermutationDecl<'_>], constants: &[&str], techniques: &[&str]) -> Strings {
    let mut strings = Strings::default();
    for value in ["UIName", "SasUiVisible", "DiffuseMap", "DiffuseSampler"] {
        strings.add(value);
    }
    for (name, _, options) in permutations {
        strings.add(name);
        options.iter().for_each(|option| strings.add(option));
    }
    constants.iter().for_each(|constant| strings.add(constant));
    techniques.iter().for_each(|technique| strings.add(technique));
    strings
}

fn write_stage(w: &mut ByteWriter, version: u32, strings: &Strings, stage_type: u8, constant: &str) {
    w.write_u8(stage_type);
    w.write_u32(4).write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]);
    w.write_u32(1)
        .write_u32(strings.get(constant))
        .write_u32(0)
        .write_u32(4)
        .write_u8(0)
        .write_u32(1);
    w.write_u32(4).write_f32_slice(&[1.0, 0.5, 0.25, 1.0]);
    w.write_u8(1)
        .write_u8(0)
        .write_u32(strings.get("DiffuseMap"))
        .write_u8(2)
        .write_u8(1);
    w.write_u8(1).write_u8(0);
    if version >= 4 {
        w.write_u32(strings.get("DiffuseSampler"));
    }
    w.write_u8(2)
        .write_u8(2)
        .write_u8(2)
        .write_u8(1)
        .write_u8(1)
        .write_u8(1)
        .write_f32(0.0)
        .write_u8(4)
        .write_u8(0);
}

/// One pass per technique with a vertex and a fragment stage, both exposing `constant`.
fn write_variant(w: &mut ByteWriter, version: u32, strings: &Strings, techniques: &[&str], constant: &str) {
    if version > 6 {
        w.write_u8(techniques.len() as u8);
    }
    for technique in techniques {
        if version > 6 {
            w.write_u32(strings.get(technique));
        }
        w.write_u8(1);
        w.write_u8(2);
        write_stage(w, version, strings, 0, constant);
        write_stage(w, version, strings, 1, constant);
        w.write_u8(1).write_u32(7).write_u32(1);
    }

    w.write_u16(1);
    w.write_u32(strings.get(constant)).write_u8(2);
    w.write_u32(strings.get("UIName"))
        .write_u8(3)
        .write_u32(strings.get(constant));
    w.write_u32(strings.get("SasUiVisible"))
        .write_u8(0)
        .write_u32(1);
}

/// Builds a version >= 5 effect with one variant per entry of `constants`.
fn build_effect(version: u32, permutations: &[PermutationDecl<'_>], constants: &[&str], techniques: &[&str]) -> Vec<u8> {
    let strings = strings_for(permutations, constants, techniques);

    let mut w = ByteWriter::new();
    w.write_u32(version);
    w.write_u32(strings.table.len() as u32)
        .write_bytes(&strings.table);

    w.write_u8(permutations.len() as u8);
    for (name, default, options) in permutations {
        w.write_u32(strings.get(name))
            .write_u8(*default)
            .write_u8(options.len() as u8);
        for option in options.iter() {
            w.write_u32(strings.get(option));
        }
    }

    w.write_u32(constants.len() as u32);
    let offset_table = w.position();
    for index in 0..constants.len() {
        w.write_u32(index as u32).write_u32(0).write_u32(0);
    }
    w.write_u32(0);
    let section_field = w.position();
    w.write_u32(0);
    let section = w.position() as u32;
    w.patch_u32(section_field, section);

    for (index, constant) in constants.iter().enumerate() {
        let start = w.position();
        write_variant(&mut w, version, &strings, techniques, constant);
        let size = w.position() - start;
        w.patch_u32(offset_table + index * 12 + 4, start as u32);
        w.patch_u32(offset_table + index * 12 + 8, size as u32);
    }

    w.into_bytes()
}

fn build_legacy_effect(version: u32) -> Vec<u8> {
    let strings = strings_for(&[], &["LegacyColor"], &[]);

    let mut w = ByteWriter::new();
    w.write_u32(version)
        .write_u32(1)
        .write_u32(0)
        .write_u32(0)
        .write_u32(0);
    w.write_u32(strings.table.len() as u32)
        .write_bytes(&strings.table);

    let start = w.position() as u32;
    w.patch_u32(12, start);
    write_variant(&mut w, version, &strings, &["Main"], "LegacyColor");
    w.into_bytes()
}

fn options(selection: &[(&str, &str)]) -> HashMap<String, String> {
    selection
        .iter()
        .map(|(name, option)| (name.to_string(), option.to_string()))
        .collect()
}

const QUALITY: PermutationDecl<'static> = ("Quality", 0, &["Low", "High"]);

#[test]
fn rejects_unsupported_versions() {
    for version in [0, 1, 9, 42] {
        let mut w = ByteWriter::new();
        w.write_u32(version).write_u32(0);
        let err = EffectReader::parse_effect(w.into_bytes()).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedVersion { version: v } if v == version));
    }
}

#[test]
fn zero_header_size_is_an_empty_effect() {
    let mut w = ByteWriter::new();
    w.write_u32(6).write_u32(0).write_u8(0).write_u32(0);
    assert!(matches!(
        EffectReader::parse_effect(w.into_bytes()),
        Err(ParserError::EmptyEffect)
    ));

    let mut legacy = ByteWriter::new();
    legacy.write_u32(3).write_u32(0);
    assert!(matches!(
        EffectReader::parse_effect(legacy.into_bytes()),
        Err(ParserError::EmptyEffect)
    ));
}

#[test]
fn quality_permutation_selects_variants() -> Result<(), anyhow::Error> {
    let data = build_effect(6, &[QUALITY], &["LowColor", "HighColor"], &[]);
    let effect = EffectReader::parse_effect(data)?;

    assert_eq!(effect.version(), 6);
    assert_eq!(effect.permutations().len(), 1);
    assert_eq!(effect.permutations()[0].options, vec!["Low", "High"]);
    assert_eq!(effect.variant_index(&options(&[("Quality", "High")]))?, 1);
    assert_eq!(effect.variant_index(&options(&[("Quality", "Low")]))?, 0);
    assert_eq!(effect.variant_index(&HashMap::new())?, 0);

    let high = effect.variant(&options(&[("Quality", "High")]))?;
    assert_eq!(high.index, 1);
    assert!(high.has_constant("HighColor"));
    assert!(!high.has_constant("LowColor"));

    let main = high.technique("Main").expect("versions before 7 have a single Main technique");
    assert_eq!(main.passes.len(), 1);
    let pass = &main.passes[0];
    assert_eq!(pass.stages[0].stage_type, StageType::Vertex);
    assert_eq!(pass.stages[1].stage_type, StageType::Fragment);
    assert_eq!(effect.code(&pass.stages[0]), &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(pass.stages[0].constant_values, vec![1.0, 0.5, 0.25, 1.0]);
    assert_eq!(pass.states[0].state, 7);

    let low = effect.variant(&HashMap::new())?;
    assert!(low.has_constant("LowColor"));
    Ok(())
}

#[test]
fn variant_index_is_bijective() -> Result<(), anyhow::Error> {
    let permutations: [PermutationDecl<'_>; 2] = [("Fog", 0, &["Off", "On"]), ("Shadow", 1, &["None", "Hard", "Soft"])];
    let constants = ["C0", "C1", "C2", "C3", "C4", "C5"];
    let effect = EffectReader::parse_effect(build_effect(6, &permutations, &constants, &[]))?;
    assert_eq!(effect.variant_count(), Some(6));

    let mut seen = HashSet::new();
    for fog in ["Off", "On"] {
        for shadow in ["None", "Hard", "Soft"] {
            let index = effect.variant_index(&options(&[("Fog", fog), ("Shadow", shadow)]))?;
            assert!(index < 6);
            assert!(seen.insert(index), "{fog}/{shadow} collides");
        }
    }
    assert_eq!(seen.len(), 6);

    // The first permutation is the least significant digit.
    assert_eq!(effect.variant_index(&options(&[("Fog", "On"), ("Shadow", "Soft")]))?, 5);
    // Shadow defaults to Hard.
    assert_eq!(effect.variant_index(&HashMap::new())?, 2);
    Ok(())
}

#[test]
fn wide_permutation_sets_still_index() -> Result<(), anyhow::Error> {
    let names = (0..64).map(|i| format!("P{i}")).collect::<Vec<_>>();
    let permutations = names
        .iter()
        .map(|name| (name.as_str(), 0u8, &["Off", "On"][..]))
        .collect::<Vec<PermutationDecl<'_>>>();
    let effect = EffectReader::parse_effect(build_effect(6, &permutations, &["C0"], &[]))?;

    // 2^64 combinations don't fit, every single index below u32::MAX does.
    assert_eq!(effect.variant_count(), None);
    assert_eq!(effect.variant_index(&HashMap::new())?, 0);
    assert_eq!(effect.variant_index(&options(&[("P31", "On")]))?, 1 << 31);
    assert!(matches!(
        effect.variant_index(&options(&[("P32", "On")])),
        Err(ParserError::FormatError { .. })
    ));
    Ok(())
}

#[test]
fn unknown_option_label_fails() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_effect(6, &[QUALITY], &["LowColor", "HighColor"], &[]))?;
    let err = effect
        .variant(&options(&[("Quality", "Ultra")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ParserError::InvalidPermutationOption { ref permutation, ref option } if permutation == "Quality" && option == "Ultra"
    ));

    // Names which are no permutation of this effect don't matter.
    assert_eq!(effect.variant_index(&options(&[("Skinned", "Yes")]))?, 0);
    Ok(())
}

#[test]
fn variants_are_decoded_once() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_effect(6, &[QUALITY], &["LowColor", "HighColor"], &[]))?;
    assert_eq!(effect.cached_variant_count(), 0);

    let first = effect.variant(&options(&[("Quality", "High")]))?;
    let second = effect.variant(&options(&[("Quality", "High")]))?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(effect.cached_variant_count(), 1);
    Ok(())
}

#[test]
fn failed_variants_are_not_cached() -> Result<(), anyhow::Error> {
    let mut data = build_effect(6, &[QUALITY], &["LowColor", "HighColor"], &[]);
    data.truncate(data.len() - 10);
    let effect = EffectReader::parse_effect(data)?;

    assert!(effect.variant(&HashMap::new()).is_ok());
    let high = options(&[("Quality", "High")]);
    assert!(matches!(
        effect.variant(&high),
        Err(ParserError::TruncatedBuffer { .. })
    ));
    assert!(effect.variant(&high).is_err());
    assert_eq!(effect.cached_variant_count(), 1);
    Ok(())
}

#[test]
fn missing_offset_row_is_a_format_error() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_effect(6, &[QUALITY], &["LowColor"], &[]))?;
    assert_eq!(effect.offsets().len(), 1);
    assert!(matches!(
        effect.variant(&options(&[("Quality", "High")])),
        Err(ParserError::FormatError { .. })
    ));
    Ok(())
}

#[test]
fn version_7_names_its_techniques() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_effect(7, &[], &["Color"], &["Main", "Depth"]))?;
    let variant = effect.variant(&HashMap::new())?;
    assert_eq!(
        variant.techniques.keys().collect::<Vec<_>>(),
        vec!["Depth", "Main"]
    );
    assert!(variant.technique("Depth").is_some_and(|t| t.has_texture("DiffuseMap")));
    Ok(())
}

#[test]
fn duplicate_technique_fails() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_effect(8, &[], &["Color"], &["Main", "Main"]))?;
    assert!(matches!(
        effect.variant(&HashMap::new()),
        Err(ParserError::FormatError { .. })
    ));
    assert_eq!(effect.cached_variant_count(), 0);
    Ok(())
}

#[test]
fn out_of_range_default_option_fails() {
    let data = build_effect(6, &[("Quality", 2, &["Low", "High"])], &["A", "B"], &[]);
    assert!(matches!(
        EffectReader::parse_effect(data),
        Err(ParserError::FormatError { .. })
    ));
}

#[test]
fn legacy_layout_has_one_variant() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_legacy_effect(4))?;
    assert!(effect.permutations().is_empty());
    assert_eq!(effect.offsets().len(), 1);
    assert_eq!(effect.variant_count(), Some(1));

    let variant = effect.variant(&HashMap::new())?;
    assert!(variant.has_constant("LegacyColor"));
    assert!(variant.has_sampler("DiffuseSampler"));
    Ok(())
}

#[test]
fn legacy_samplers_before_version_4_are_unnamed() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_legacy_effect(3))?;
    let variant = effect.variant(&HashMap::new())?;
    let stage = &variant.technique("Main").expect("single technique").passes[0].stages[0];
    assert_eq!(stage.samplers.len(), 1);
    assert_eq!(stage.samplers[0].name, "");
    assert_eq!(stage.samplers[0].max_anisotropy, 4);
    Ok(())
}

#[test]
fn exposes_parameters_and_annotations() -> Result<(), anyhow::Error> {
    let effect = EffectReader::parse_effect(build_effect(6, &[], &["GlowColor"], &[]))?;
    let variant = effect.variant(&HashMap::new())?;

    let names = variant.parameter_names();
    assert!(names.contains("GlowColor"));
    assert!(names.contains("DiffuseMap"));
    assert!(variant.has_texture("DiffuseMap"));
    assert!(!variant.has_texture("NormalMap"));

    let annotation = &variant.annotations["GlowColor"];
    assert_eq!(
        annotation.get("UIName"),
        Some(&AnnotationValue::String("GlowColor".to_string()))
    );
    assert_eq!(annotation.get("SasUiVisible"), Some(&AnnotationValue::Bool(true)));
    Ok(())
}
