use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use log::warn;

use crate::ParserError;
use crate::common::reader::{ByteCursor, Parseable};
use crate::graph::reader::GraphReader;

/// Position of an instance inside the arena of an [`ObjectGraph`]. A reference is valid as soon
/// as the instance got its slot, which is before its properties are read, so cycles are fine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) usize);

impl ObjectRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A list property. Null references stay in place so element positions are preserved.
pub type ObjectList = Vec<Option<ObjectRef>>;

/// A type the graph format can construct and populate.
///
/// Implemented through `#[derive(GraphObject)]`, which builds the property dispatch of the type
/// from its fields at compile time.
pub trait GraphObject: Any + Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Reads the value of `property` from `rdr` into `self`.
    /// Returns `Ok(false)` when the type has no reader for `property`.
    fn read_property(
        &mut self,
        property: &str,
        ctx: &mut GraphReader<'_>,
        rdr: &mut ByteCursor<'_>,
    ) -> Result<bool, ParserError>;

    /// String valued field lookup, used to key lists into maps.
    fn key_field(&self, _field: &str) -> Option<String> {
        None
    }

    /// Called once all properties of the instance have been read.
    fn initialize(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A [`GraphObject`] that can be registered by name.
pub trait GraphType: GraphObject + Default {
    const TYPE_NAME: &'static str;
}

/// Values that can be read for a property purely based on their rust type.
pub trait GraphValue: Sized {
    fn read_value(ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError>;
}

macro_rules! graph_value_via_parseable {
    ($($ty:ty),*) => {
        $(
            impl GraphValue for $ty {
                fn read_value(_ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError> {
                    <$ty as Parseable<$ty>>::parse(rdr)
                }
            }
        )*
    };
}

graph_value_via_parseable!(bool, u8, u16, u32, f32, String, Vec2, Vec3, Vec4, Quat, Mat4);

impl GraphValue for Option<ObjectRef> {
    fn read_value(ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError> {
        ctx.read_object(rdr)
    }
}

impl GraphValue for ObjectList {
    fn read_value(ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError> {
        ctx.read_object_list(rdr)
    }
}

/// A resource path. Read like a string, but passed through the path handler of the
/// reader and recorded as a dependency of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GraphPath(pub String);

impl GraphPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl GraphValue for GraphPath {
    fn read_value(ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError> {
        ctx.read_path(rdr).map(GraphPath)
    }
}

/// Flags encoded as `"A=1,B=2"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumMap(pub BTreeMap<String, i64>);

impl EnumMap {
    pub fn parse(value: &str) -> Result<Self, ParserError> {
        let mut map = BTreeMap::new();
        if value.is_empty() {
            return Ok(EnumMap(map));
        }

        for entry in value.split(',') {
            let (key, number) = entry
                .split_once('=')
                .ok_or_else(|| ParserError::format(format!("enum entry \"{entry}\" has no value")))?;
            let number = number
                .trim()
                .parse::<i64>()
                .map_err(|_| ParserError::format(format!("enum entry \"{entry}\" is not numeric")))?;

            if map.insert(key.trim().to_string(), number).is_some() {
                warn!("Enum key '{}' defined twice in \"{}\"", key, value);
            }
        }

        Ok(EnumMap(map))
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.0.get(key).copied()
    }
}

impl GraphValue for EnumMap {
    fn read_value(_ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError> {
        EnumMap::parse(&rdr.read_string_u16()?)
    }
}

/// 32 bit index data, stored as `u32 count | u16 element size | data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBuffer(pub Vec<u32>);

impl GraphValue for IndexBuffer {
    fn read_value(_ctx: &mut GraphReader<'_>, rdr: &mut ByteCursor<'_>) -> Result<Self, ParserError> {
        let count = rdr.read_u32()? as usize;
        let element_size = rdr.read_u16()?;
        if element_size != 4 {
            return Err(ParserError::InvalidReader {
                property: "index buffer".to_string(),
                reason: "only 32 bit indices are supported",
            });
        }
        Ok(IndexBuffer(rdr.read_u32_array(count)?))
    }
}

/// A map property built from a list by one string field of its elements.
pub type KeyedObjects = HashMap<String, ObjectRef>;

type Constructor = fn() -> Box<dyn GraphObject>;

fn construct_default<T: GraphType>() -> Box<dyn GraphObject> {
    Box::<T>::default()
}

/// Name to constructor table of every type the graph format may instantiate.
/// Built once at startup and shared read only afterwards.
#[derive(Debug)]
pub struct TypeRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    constructors: HashMap<&'static str, Constructor>,
}

impl TypeRegistryBuilder {
    pub fn register<T: GraphType>(&mut self) -> &mut Self {
        if self
            .constructors
            .insert(T::TYPE_NAME, construct_default::<T> as Constructor)
            .is_some()
        {
            warn!("Graph type {} registered twice", T::TYPE_NAME);
        }
        self
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            constructors: self.constructors,
        }
    }
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn construct(&self, type_name: &str) -> Result<Box<dyn GraphObject>, ParserError> {
        self.constructors
            .get(type_name)
            .map(|constructor| constructor())
            .ok_or_else(|| ParserError::UnknownType {
                type_name: type_name.to_string(),
            })
    }
}

/// The result of decoding one graph buffer: an arena of instances plus the root.
#[derive(Debug)]
pub struct ObjectGraph {
    pub(crate) objects: Vec<Box<dyn GraphObject>>,
    pub(crate) root: ObjectRef,
    pub(crate) paths: Vec<String>,
    pub(crate) warnings: Vec<String>,
}

impl ObjectGraph {
    pub fn root(&self) -> ObjectRef {
        self.root
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, object: ObjectRef) -> Option<&dyn GraphObject> {
        self.objects.get(object.0).map(|boxed| boxed.as_ref())
    }

    pub fn get_mut(&mut self, object: ObjectRef) -> Option<&mut dyn GraphObject> {
        self.objects.get_mut(object.0).map(|boxed| boxed.as_mut())
    }

    pub fn get_as<T: GraphObject>(&self, object: ObjectRef) -> Option<&T> {
        self.get(object)?.as_any().downcast_ref::<T>()
    }

    pub fn root_as<T: GraphObject>(&self) -> Option<&T> {
        self.get_as(self.root)
    }

    /// Resolves an optional reference field directly into the referenced instance.
    pub fn resolve<T: GraphObject>(&self, object: Option<ObjectRef>) -> Option<&T> {
        object.and_then(|object| self.get_as(object))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &dyn GraphObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (ObjectRef(index), object.as_ref()))
    }

    pub fn find_by_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = ObjectRef> + 'a {
        self.iter()
            .filter(move |(_, object)| object.type_name() == type_name)
            .map(|(object, _)| object)
    }

    /// Every resource path the graph refers to, after the path handler was applied.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Non fatal problems found while decoding (e.g. duplicate keys).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl From<String> for GraphPath {
    fn from(value: String) -> Self {
        GraphPath(value)
    }
}
