use std::collections::HashMap;

use crate::resources::ResourceError;

/// Resource paths are case insensitive and always use forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.to_lowercase().replace('\\', "/")
}

/// Extension of the last path segment, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next()?;
    let (_, extension) = file_name.rsplit_once('.')?;
    (!extension.is_empty()).then_some(extension)
}

/// `res:/fx/glow.sm_hi` → `("res", "fx/glow.sm_hi")`
pub fn split_prefix(path: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = path.split_once(":/")?;
    Some((prefix, rest.trim_start_matches('/')))
}

/// Maps resource prefixes to the base url they are served from.
#[derive(Debug, Default, Clone)]
pub struct PrefixTable {
    prefixes: HashMap<String, String>,
}

impl PrefixTable {
    pub fn register(&mut self, prefix: &str, base: impl Into<String>) {
        self.prefixes.insert(prefix.to_lowercase(), base.into());
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.prefixes.contains_key(prefix)
    }

    /// Builds the url of a normalized path. Paths without a prefix are used as they are.
    pub fn resolve(&self, path: &str) -> Result<String, ResourceError> {
        let Some((prefix, rest)) = split_prefix(path) else {
            return Ok(path.to_string());
        };

        let base = self
            .prefixes
            .get(prefix)
            .ok_or_else(|| ResourceError::UnregisteredPrefix {
                prefix: prefix.to_string(),
                path: path.to_string(),
            })?;

        if base.is_empty() {
            Ok(rest.to_string())
        } else {
            Ok(format!("{}/{}", base.trim_end_matches('/'), rest))
        }
    }
}
