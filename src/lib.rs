//! lcache - An in-process load-through cache
//!
//! Memoizes an expensive synchronous computation per parameter tuple and
//! refreshes results in the background (stale-while-revalidate), with at most
//! one load in flight per key and optional LRU eviction.

pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
mod tasks;

pub use cache::{
    codec_fn, Cache, CacheBuilder, CacheKey, CacheStats, DefaultKeyCodec, KeyCodec, KeyEncoder,
    KeyPart, LoadResult, Params,
};
pub use config::{CacheConfig, EvictionMode, DEFAULT_CAPACITY};
pub use error::{CacheError, Result};
pub use loader::{loader_fn, FnLoader, LoadContext, Loader};
