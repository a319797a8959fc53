//! Resource lifecycle: paths are requested, fetched, queued and decoded under a time budget, then
//! kept in the [`store::ResourceStore`] until they are purged.

use std::any::Any;
use std::sync::Arc;

use lodestar_files::ParserError;
use thiserror::Error;

use crate::io::FetchError;

pub mod clock;
pub mod entry;
pub mod handle;
pub mod loaders;
pub mod paths;
pub mod scheduler;
pub mod store;
pub mod watch;

pub use entry::{ResourceEntry, ResourceState};
pub use handle::ResourceHandle;
pub use scheduler::ResourceScheduler;

/// A decoded resource. Downcast it with [`ResourceEntry::payload_as`] or
/// [`ResourceScheduler::get`].
pub type Payload = Arc<dyn Any + Send + Sync>;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: ParserError,
    },

    #[error("No loader is registered for the extension of {path}")]
    UnknownExtension { path: String },

    #[error("Unregistered resource prefix \"{prefix}\" in {path}")]
    UnregisteredPrefix { prefix: String, path: String },

    #[error("{feature} are not supported ({path})")]
    Unsupported { feature: &'static str, path: String },

    #[error("{path} was removed before it finished loading")]
    Purged { path: String },

    #[error("{path} is already registered")]
    AlreadyRegistered { path: String },

    #[error("The payload of {path} is not a {expected}")]
    UnexpectedPayload { path: String, expected: &'static str },
}
