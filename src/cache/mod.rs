//! Cache Module
//!
//! Provides a bounded in-memory cache with TTL expiry, tag and pattern
//! invalidation, and LRU/LFU/age-based eviction.

mod entry;
mod shared;
mod stats;
mod store;
mod strategy;


// Re-export public types
pub use entry::{AccessRecord, CacheEntry};
pub use shared::{KeyGenerator, MemoizeOptions, Memoized, PreloadOutcome, SharedCache};
pub use stats::CacheStats;
pub use store::{CacheStore, SetOptions};
pub use strategy::EvictionStrategy;
