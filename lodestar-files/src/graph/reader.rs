use std::collections::HashMap;

use log::{trace, warn};

use crate::ParserError;
use crate::common::reader::{ByteCursor, Parseable};
use crate::graph::types::{GraphObject, KeyedObjects, ObjectGraph, ObjectList, ObjectRef, TypeRegistry};

/// Rewrites resource paths while they are read, e.g. to redirect them to another prefix.
pub type PathHandler = dyn Fn(&str) -> String + Send + Sync;

/// Decodes one object graph buffer.
///
/// A reader owns the reference table of exactly one decode call, so decoding several buffers
/// at once never mixes up their object ids. Wire layout of a referenced object:
/// `u32 id | u32 length | length bytes { u16 type name | (u16 property name | value)* }`.
/// Id 0 is a null reference, ids seen before resolve to the existing instance.
pub struct GraphReader<'r> {
    registry: &'r TypeRegistry,
    path_handler: Option<&'r PathHandler>,
    /// `None` while an instance is still being populated.
    objects: Vec<Option<Box<dyn GraphObject>>>,
    references: HashMap<u32, ObjectRef>,
    paths: Vec<String>,
    warnings: Vec<String>,
}

impl<'r> GraphReader<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            path_handler: None,
            objects: Vec::new(),
            references: HashMap::new(),
            paths: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_path_handler(mut self, handler: &'r PathHandler) -> Self {
        self.path_handler = Some(handler);
        self
    }

    /// Decodes a whole buffer. The buffer holds exactly one referenced root object.
    pub fn parse_graph(mut self, data: &[u8]) -> Result<ObjectGraph, ParserError> {
        let mut rdr = ByteCursor::new(data);
        let root = self
            .read_object(&mut rdr)?
            .ok_or_else(|| ParserError::format("the root object is a null reference"))?;
        rdr.expect_end("object graph did not read to end")?;

        // Every slot gets filled before read_object returns, an error aborts the whole decode.
        let objects = self
            .objects
            .into_iter()
            .map(|object| object.ok_or_else(|| ParserError::format("object was never completed")))
            .collect::<Result<Vec<_>, _>>()?;

        trace!("Decoded object graph with {} objects", objects.len());
        Ok(ObjectGraph {
            objects,
            root,
            paths: self.paths,
            warnings: self.warnings,
        })
    }

    /// Reads a referenced object: an id followed by the object, unless the id is null or known.
    pub fn read_object(&mut self, rdr: &mut ByteCursor<'_>) -> Result<Option<ObjectRef>, ParserError> {
        let id = rdr.read_u32()?;
        if id == 0 {
            return Ok(None);
        }

        if let Some(existing) = self.references.get(&id) {
            return Ok(Some(*existing));
        }

        self.construct(rdr, Some(id)).map(Some)
    }

    /// Reads an object without an id. It can't be referenced from anywhere else.
    pub fn read_raw_object(&mut self, rdr: &mut ByteCursor<'_>) -> Result<ObjectRef, ParserError> {
        self.construct(rdr, None)
    }

    pub fn read_object_list(&mut self, rdr: &mut ByteCursor<'_>) -> Result<ObjectList, ParserError> {
        let count = rdr.read_u32()?;
        let mut list = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            list.push(self.read_object(rdr)?);
        }
        Ok(list)
    }

    pub fn read_path(&mut self, rdr: &mut ByteCursor<'_>) -> Result<String, ParserError> {
        let path = rdr.read_string_u16()?;
        let path = match self.path_handler {
            Some(handler) => handler(&path),
            None => path,
        };

        if !path.is_empty() {
            self.paths.push(path.clone());
        }
        Ok(path)
    }

    /// `u32 count | u16 element size | count * element`, every element read from its own slice.
    pub fn read_struct_list<T: Parseable<T>>(&mut self, rdr: &mut ByteCursor<'_>) -> Result<Vec<T>, ParserError> {
        let count = rdr.read_u32()?;
        let element_size = rdr.read_u16()? as usize;
        let mut list = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let mut struct_reader = rdr.slice(element_size)?;
            list.push(T::parse(&mut struct_reader)?);
            struct_reader.expect_end("struct read to end")?;
        }
        Ok(list)
    }

    /// Reads a list and stores its elements in `target`, keyed by the string field `key`
    /// of each element. A key that is already present is overwritten with a warning.
    pub fn read_keyed_list(
        &mut self,
        rdr: &mut ByteCursor<'_>,
        target: &mut KeyedObjects,
        property: &str,
        key: &str,
    ) -> Result<(), ParserError> {
        let list = self.read_object_list(rdr)?;
        for element in list {
            let element = element.ok_or_else(|| ParserError::InvalidReader {
                property: property.to_string(),
                reason: "list element is a null reference",
            })?;

            let value = self
                .objects
                .get(element.0)
                .and_then(|object| object.as_ref())
                .and_then(|object| object.key_field(key))
                .ok_or_else(|| ParserError::InvalidReader {
                    property: property.to_string(),
                    reason: "list element has no such key field",
                })?;

            if target.insert(value.clone(), element).is_some() {
                warn!("Property '{}' already defined in '{}'", value, property);
                self.warnings
                    .push(format!("{property}: duplicate key \"{value}\""));
            }
        }
        Ok(())
    }

    pub fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn construct(&mut self, rdr: &mut ByteCursor<'_>, id: Option<u32>) -> Result<ObjectRef, ParserError> {
        let length = rdr.read_u32()? as usize;
        let mut object_reader = rdr.slice(length)?;
        let type_name = object_reader.read_string_u16()?;
        let mut object = self.registry.construct(&type_name)?;

        // Register before reading any property, so references back to this object resolve to it.
        let slot = ObjectRef(self.objects.len());
        self.objects.push(None);
        if let Some(id) = id {
            self.references.insert(id, slot);
        }

        while !object_reader.at_end() {
            let property = object_reader.read_string_u16()?;
            let known = object
                .read_property(&property, self, &mut object_reader)
                .map_err(|source| ParserError::Property {
                    type_name: object.type_name(),
                    property: property.clone(),
                    source: Box::new(source),
                })?;

            if !known {
                return Err(ParserError::UnknownProperty {
                    type_name,
                    property,
                });
            }
        }

        object_reader.expect_end("object did not read to end")?;
        object.initialize();

        self.objects[slot.0] = Some(object);
        Ok(slot)
    }
}
