use std::collections::HashMap;
use std::sync::Arc;

use lodestar_files::ParserError;
use lodestar_files::effect::reader::EffectReader;
use lodestar_files::graph::reader::{GraphReader, PathHandler};
use lodestar_files::graph::types::TypeRegistry;

use crate::io::{FetchedData, ResponseKind};
use crate::resources::Payload;
use crate::resources::paths::extension;

/// Turns fetched data into a payload. Loaders are picked by the extension of the resource path.
pub trait ResourceLoader: Send + Sync {
    fn response_kind(&self) -> ResponseKind {
        ResponseKind::Bytes
    }

    fn decode(&self, path: &str, data: FetchedData) -> Result<Payload, ParserError>;
}

fn into_bytes(data: FetchedData) -> Result<Vec<u8>, ParserError> {
    match data {
        FetchedData::Bytes(bytes) => Ok(bytes),
        other => Err(ParserError::FormatError {
            reason: format!("Expected binary data, got {:?}", other.kind()),
        }),
    }
}

/// `.black` object graphs.
pub struct GraphLoader {
    types: Arc<TypeRegistry>,
    path_handler: Option<Arc<PathHandler>>,
}

impl GraphLoader {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            path_handler: None,
        }
    }

    /// Rewrites every path property while decoding.
    pub fn with_path_handler(mut self, handler: Arc<PathHandler>) -> Self {
        self.path_handler = Some(handler);
        self
    }
}

impl ResourceLoader for GraphLoader {
    fn decode(&self, _path: &str, data: FetchedData) -> Result<Payload, ParserError> {
        let bytes = into_bytes(data)?;
        let mut reader = GraphReader::new(&self.types);
        if let Some(handler) = &self.path_handler {
            reader = reader.with_path_handler(handler.as_ref());
        }

        Ok(Arc::new(reader.parse_graph(&bytes)?))
    }
}

/// Compiled shader effects.
pub struct EffectLoader;

impl ResourceLoader for EffectLoader {
    fn decode(&self, _path: &str, data: FetchedData) -> Result<Payload, ParserError> {
        Ok(Arc::new(EffectReader::parse_effect(into_bytes(data)?)?))
    }
}

/// Keeps the bytes as they are, as `Vec<u8>`.
pub struct RawLoader;

impl ResourceLoader for RawLoader {
    fn decode(&self, _path: &str, data: FetchedData) -> Result<Payload, ParserError> {
        Ok(Arc::new(into_bytes(data)?))
    }
}

pub struct TextLoader;

impl ResourceLoader for TextLoader {
    fn response_kind(&self) -> ResponseKind {
        ResponseKind::Text
    }

    fn decode(&self, _path: &str, data: FetchedData) -> Result<Payload, ParserError> {
        match data {
            FetchedData::Text(text) => Ok(Arc::new(text)),
            other => Err(ParserError::FormatError {
                reason: format!("Expected text, got {:?}", other.kind()),
            }),
        }
    }
}

/// Payload is a [`serde_json::Value`].
pub struct JsonLoader;

impl ResourceLoader for JsonLoader {
    fn response_kind(&self) -> ResponseKind {
        ResponseKind::Json
    }

    fn decode(&self, _path: &str, data: FetchedData) -> Result<Payload, ParserError> {
        match data {
            FetchedData::Json(value) => Ok(Arc::new(value)),
            other => Err(ParserError::FormatError {
                reason: format!("Expected json, got {:?}", other.kind()),
            }),
        }
    }
}

#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn ResourceLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graphs, effects, raw bytes, text and json.
    pub fn with_defaults(types: Arc<TypeRegistry>) -> Self {
        let mut registry = Self::new();
        registry
            .register(&["black"], Arc::new(GraphLoader::new(types)))
            .register(&["sm_hi", "sm_lo", "sm_depth", "fx"], Arc::new(EffectLoader))
            .register(&["bin", "raw"], Arc::new(RawLoader))
            .register(&["txt"], Arc::new(TextLoader))
            .register(&["json"], Arc::new(JsonLoader));
        registry
    }

    /// Replaces loaders previously registered for the same extensions.
    pub fn register(&mut self, extensions: &[&str], loader: Arc<dyn ResourceLoader>) -> &mut Self {
        for extension in extensions {
            self.loaders
                .insert(extension.trim_start_matches('.').to_lowercase(), loader.clone());
        }
        self
    }

    pub fn find(&self, path: &str) -> Option<Arc<dyn ResourceLoader>> {
        let extension = extension(path)?.to_lowercase();
        self.loaders.get(&extension).cloned()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_loaders_by_extension() {
        let registry = LoaderRegistry::with_defaults(Arc::new(TypeRegistry::builder().build()));

        assert!(registry.find("res:/graphics/ship.black").is_some());
        assert!(registry.find("res:/fx/glow.SM_HI").is_some());
        assert!(registry.find("res:/unknown.xyz").is_none());
        assert!(registry.find("res:/no_extension").is_none());
        assert_eq!(
            registry.find("res:/a.json").map(|loader| loader.response_kind()),
            Some(ResponseKind::Json)
        );
    }

    #[test]
    fn rejects_mismatched_data() {
        let result = RawLoader.decode("res:/a.bin", FetchedData::Text("text".to_string()));
        assert!(matches!(result, Err(ParserError::FormatError { .. })));

        let payload = TextLoader
            .decode("res:/a.txt", FetchedData::Text("hello".to_string()))
            .unwrap();
        assert_eq!(payload.downcast::<String>().unwrap().as_str(), "hello");
    }
}
