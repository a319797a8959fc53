//! Compiled shader effect containers.
//!
//! An effect file holds every compiled variant of a shader. Which variant is used depends on the
//! selected option of each permutation, see [`types::EffectFile::variant`].

pub mod reader;
pub mod types;

#[cfg(test)]
mod tests;
