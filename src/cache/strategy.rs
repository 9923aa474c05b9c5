//! Eviction Strategy Module
//!
//! Chooses which entry to remove when the store is at capacity.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::CacheError;

// == Eviction Strategy ==
/// Policy used to pick a single victim key.
///
/// Ties are broken by write order (oldest write first), which keeps the
/// choice deterministic regardless of map iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently used: oldest read, or oldest write if never read
    #[default]
    Lru,
    /// Least frequently used: fewest successful reads
    Lfu,
    /// Absolute age: oldest `stored_at`, ignoring reads
    Ttl,
}

impl EvictionStrategy {
    // == Select Victim ==
    /// Returns the key this strategy would evict, or None if `entries` is empty.
    pub fn select_victim<V>(self, entries: &HashMap<String, CacheEntry<V>>) -> Option<String> {
        let victim = match self {
            EvictionStrategy::Lru => entries
                .iter()
                .min_by_key(|(_, e)| (e.access.last_accessed_at, e.access.touch_seq)),
            EvictionStrategy::Lfu => entries
                .iter()
                .min_by_key(|(_, e)| (e.access.hit_count, e.write_seq)),
            EvictionStrategy::Ttl => entries
                .iter()
                .min_by_key(|(_, e)| (e.stored_at, e.write_seq)),
        };

        victim.map(|(key, _)| key.clone())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Ttl => "ttl",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "ttl" => Ok(EvictionStrategy::Ttl),
            other => Err(CacheError::Configuration(format!(
                "Unknown eviction strategy: {}",
                other
            ))),
        }
    }
}
