//! Generic scene graph types that any `.black` file may contain. Game specific objects register
//! themselves on top of [`register_builtin`].

use glam::{Mat4, Quat, Vec3, Vec4};
use lodestar_files::GraphObject;
use lodestar_files::graph::types::{GraphPath, KeyedObjects, ObjectList, TypeRegistry, TypeRegistryBuilder};

#[derive(Debug, GraphObject)]
#[graph(name = "TriVector4Parameter")]
pub struct Vector4Parameter {
    pub name: String,
    pub value: Vec4,
}

impl Default for Vector4Parameter {
    fn default() -> Self {
        Self {
            name: String::new(),
            value: Vec4::ONE,
        }
    }
}

#[derive(Debug, Default, GraphObject)]
#[graph(name = "Tw2MatrixParameter")]
pub struct Matrix4Parameter {
    pub name: String,
    pub value: Mat4,
}

#[derive(Debug, Default, GraphObject)]
#[graph(name = "TriTextureParameter")]
pub struct TextureParameter {
    pub name: String,
    #[graph(rename = "resourcePath")]
    pub resource_path: GraphPath,
}

/// Scale, rotation around a center and translation, composed on initialization.
#[derive(Debug, GraphObject)]
#[graph(name = "Tr2TransformParameter", initialize = "update_values")]
pub struct TransformParameter {
    pub name: String,
    pub scaling: Vec3,
    #[graph(rename = "rotationCenter")]
    pub rotation_center: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
    #[graph(skip)]
    pub transform: Mat4,
    /// Transposed `transform`, as shader constants expect it.
    #[graph(skip)]
    pub world_transform: Mat4,
}

impl Default for TransformParameter {
    fn default() -> Self {
        Self {
            name: String::new(),
            scaling: Vec3::ONE,
            rotation_center: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            transform: Mat4::IDENTITY,
            world_transform: Mat4::IDENTITY,
        }
    }
}

impl TransformParameter {
    pub fn update_values(&mut self) {
        let center = Mat4::from_translation(self.rotation_center);
        self.transform = Mat4::from_translation(self.translation)
            * center
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scaling)
            * Mat4::from_translation(-self.rotation_center);
        self.world_transform = self.transform.transpose();
    }
}

/// An effect instance: the compiled effect it uses and the parameters bound to it.
#[derive(Debug, Default, GraphObject)]
#[graph(name = "Tr2Effect")]
pub struct Effect {
    pub name: String,
    #[graph(rename = "effectFilePath")]
    pub effect_file_path: GraphPath,
    #[graph(key_by = "name")]
    pub parameters: KeyedObjects,
    #[graph(key_by = "name")]
    pub resources: KeyedObjects,
}

#[derive(Debug, GraphObject)]
#[graph(name = "Tr2PostProcess")]
pub struct PostProcess {
    pub stages: ObjectList,
    pub display: bool,
    pub quality: f32,
    #[graph(rename = "autoRebuild")]
    pub auto_rebuild: bool,
}

impl Default for PostProcess {
    fn default() -> Self {
        Self {
            stages: ObjectList::new(),
            display: true,
            quality: 1.0,
            auto_rebuild: true,
        }
    }
}

pub fn register_builtin(builder: &mut TypeRegistryBuilder) -> &mut TypeRegistryBuilder {
    builder
        .register::<Vector4Parameter>()
        .register::<Matrix4Parameter>()
        .register::<TextureParameter>()
        .register::<TransformParameter>()
        .register::<Effect>()
        .register::<PostProcess>()
}

/// A registry holding only the built-in types.
pub fn registry() -> TypeRegistry {
    let mut builder = TypeRegistry::builder();
    register_builtin(&mut builder);
    builder.build()
}
