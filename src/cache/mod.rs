//! Cache Module
//!
//! Fixed-capacity, reference-counted object cache with LRU eviction, keyed by
//! request URI.

mod entry;
mod lru;
mod object_cache;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruList;
pub use object_cache::{ObjectCache, PinnedEntry, Placeholder};
pub use stats::CacheStats;
pub use store::{CacheStore, EntryId};

// == Public Constants ==
/// Total bytes of response bodies the cache may hold
pub const MAX_CACHE_SIZE: usize = 1024 * 1024; // 1 MiB

/// Largest single response admitted into the cache
pub const MAX_OBJECT_SIZE: usize = 100 * 1024; // 100 KiB

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 2048;
