pub mod directory;
pub mod fetcher;
pub mod memory;

pub use fetcher::{FetchError, FetchFuture, FetchResponse, FetchedData, Fetcher, ResponseKind};
