//! Resilient Cache - client-side caching and error recovery
//!
//! A bounded in-memory cache with TTL expiry, tag and pattern invalidation,
//! and LRU/LFU/TTL eviction, plus an executor that retries classified
//! failures with exponential backoff behind per-operation circuit breakers.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod recovery;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheStore, EvictionStrategy, SetOptions, SharedCache};
pub use config::Config;
pub use error::{CacheError, RecoveryError};
pub use recovery::{ErrorKind, ErrorRecovery, RetryOptions};
pub use tasks::spawn_cleanup_task;
