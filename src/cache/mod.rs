//! Cache Module
//!
//! Provides the load-through cache container, its per-key refresh engine,
//! key encoding and LRU eviction.

mod entry;
mod key;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub(crate) use entry::Entry;
pub use entry::LoadResult;
pub use key::{
    codec_fn, CacheKey, DefaultKeyCodec, FnKeyCodec, KeyCodec, KeyEncoder, KeyPart, Params,
};
pub use lru::LruTracker;
pub(crate) use stats::Counters;
pub use stats::CacheStats;
pub use store::{Cache, CacheBuilder};
