//! The object graph format: a self describing binary encoding of typed objects, which may
//! share instances (and form cycles) through numeric object ids.
pub mod reader;
pub mod types;
pub mod writer;
