use thiserror::Error;

// Lets the derive macros refer to this crate by name from inside the crate itself.
extern crate self as lodestar_files;

pub use lodestar_files_derive::{GraphObject, Parse};

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Tried to read {requested} bytes at offset {position}, but only {remaining} are left")]
    TruncatedBuffer {
        position: usize,
        requested: usize,
        remaining: usize,
    },

    #[error("{context} ({remaining} bytes left unread)")]
    TrailingData { context: &'static str, remaining: usize },

    #[error("Unknown type \"{type_name}\"")]
    UnknownType { type_name: String },

    #[error("Unknown property \"{property}\" for \"{type_name}\"")]
    UnknownProperty { type_name: String, property: String },

    #[error("Invalid reader for property \"{property}\": {reason}")]
    InvalidReader { property: String, reason: &'static str },

    #[error("Invalid version of effect file ({version})")]
    UnsupportedVersion { version: u32 },

    #[error("Effect file contains no compiled effects")]
    EmptyEffect,

    #[error("Invalid option \"{option}\" for permutation \"{permutation}\"")]
    InvalidPermutationOption { permutation: String, option: String },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: String },

    /// Wraps an error raised while reading a single property, so the message carries the
    /// whole property path down to the failing value.
    #[error("{property} ({type_name}) > {source}")]
    Property {
        type_name: &'static str,
        property: String,
        source: Box<ParserError>,
    },
}

impl ParserError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        ParserError::FormatError { reason: reason.into() }
    }

    /// Strips [`ParserError::Property`] wrappers and returns the error that caused them.
    pub fn root_cause(&self) -> &ParserError {
        match self {
            ParserError::Property { source, .. } => source.root_cause(),
            err => err,
        }
    }
}

pub mod common;
pub mod effect;
pub mod graph;
