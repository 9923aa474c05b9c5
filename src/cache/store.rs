//! Cache Store Module
//!
//! Main cache engine: bounded HashMap storage with TTL expiry, tag and
//! pattern invalidation, and strategy-driven eviction.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStats, EvictionStrategy};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Set Options ==
/// Per-call overrides for [`CacheStore::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// `None` uses the store default; `Some(Duration::ZERO)` never expires
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    /// `None` uses the store default
    pub strategy: Option<EvictionStrategy>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Stores the entry without a time limit.
    pub fn no_expiry(mut self) -> Self {
        self.ttl = Some(Duration::ZERO);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

// == Cache Store ==
/// Main cache storage with pluggable eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Entries, each carrying its own access record
    entries: HashMap<String, CacheEntry<V>>,
    /// Hit, miss and eviction counters
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL for entries stored without an explicit one
    default_ttl: Duration,
    default_strategy: EvictionStrategy,
    /// Monotonic counter ordering writes and reads
    seq: u64,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore with specified capacity and default TTL.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
            default_ttl,
            default_strategy: EvictionStrategy::default(),
            seq: 0,
        }
    }

    /// Creates a store from the cache section of the configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.default_ttl)
            .with_default_strategy(config.default_strategy)
    }

    pub fn with_default_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns the value if found and not expired. Expired entries are
    /// removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.stats.record_miss();
            debug!("Cache miss on expired key: {}", key);
            return None;
        }

        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, seq);
        self.stats.record_hit();
        Some(entry.value.clone())
    }

    // == Set ==
    /// Stores a value under `key`.
    ///
    /// Overwriting an existing key replaces its value, TTL and tags, resets
    /// `stored_at` and refreshes its access time while keeping its hit count.
    /// An expired entry being overwritten starts over with no hits. Inserting
    /// a new key into a full store first evicts by the requested strategy
    /// until there is room.
    pub fn set(&mut self, key: impl Into<String>, value: V, options: SetOptions) {
        let key = key.into();
        let now = Instant::now();
        let seq = self.next_seq();
        let ttl = Some(options.ttl.unwrap_or(self.default_ttl));

        let mut entry = CacheEntry::new(value, ttl, options.tags, now, seq);

        // An expired entry is logically absent; its access record does not carry over
        let inherited = self.entries.get(&key).map(|existing| {
            if existing.is_expired_at(now) {
                0
            } else {
                existing.access.hit_count
            }
        });

        match inherited {
            Some(hit_count) => entry.access.hit_count = hit_count,
            None => {
                let strategy = options.strategy.unwrap_or(self.default_strategy);
                while self.entries.len() >= self.max_entries {
                    if self.evict(strategy).is_none() {
                        break;
                    }
                }
            }
        }

        self.entries.insert(key, entry);
    }

    // == Evict ==
    /// Removes the single entry chosen by `strategy`.
    ///
    /// Returns the evicted key, or None if the store is empty.
    pub fn evict(&mut self, strategy: EvictionStrategy) -> Option<String> {
        let victim = strategy.select_victim(&self.entries)?;
        self.entries.remove(&victim);
        self.stats.record_eviction();
        debug!("Evicted '{}' using {} strategy", victim, strategy);
        Some(victim)
    }

    // == Invalidate ==
    /// Removes the entry for `key`. Returns the number removed (0 or 1).
    pub fn invalidate(&mut self, key: &str) -> usize {
        usize::from(self.entries.remove(key).is_some())
    }

    /// Removes every entry whose tag set contains `tag`.
    pub fn invalidate_by_tag(&mut self, tag: &str) -> usize {
        self.remove_where(|_, entry| entry.has_tag(tag))
    }

    /// Removes every entry whose key matches `pattern` as a regular expression.
    ///
    /// The pattern is unanchored; an invalid pattern is a configuration error.
    pub fn invalidate_by_pattern(&mut self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| {
            CacheError::Configuration(format!("Invalid pattern '{}': {}", pattern, e))
        })?;
        Ok(self.remove_where(|key, _| regex.is_match(key)))
    }

    fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !predicate(key, entry));
        before - self.entries.len()
    }

    // == Cleanup ==
    /// Removes all expired entries, then evicts by recency until the store
    /// is within capacity.
    ///
    /// Returns the number of expired entries removed.
    pub fn cleanup(&mut self) -> usize {
        let now = Instant::now();
        let expired = self.remove_where(|_, entry| entry.is_expired_at(now));
        self.trim_to_capacity();

        self.stats.record_cleanup();
        expired
    }

    // == Clear ==
    /// Removes every entry and resets all counters.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats = CacheStats::new();
        info!("Cache cleared: {} entries removed", removed);
        removed
    }

    // == Introspection ==
    /// Keys of all live entries.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Live entries carrying `tag`. Does not count as reads.
    pub fn get_by_tag(&self, tag: &str) -> Vec<(String, V)>
    where
        V: Clone,
    {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.has_tag(tag) && !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Whether a live entry exists for `key`. Does not count as a read.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Raw entry access, including expired entries not yet swept.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Changes the capacity, evicting least recently used entries until the
    /// store fits.
    pub fn set_capacity(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.trim_to_capacity();
    }

    fn trim_to_capacity(&mut self) {
        while self.entries.len() > self.max_entries {
            if self.evict(EvictionStrategy::Lru).is_none() {
                break;
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Length ==
    /// Returns the current number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> CacheStore<V> {
    // == Stats ==
    /// Returns current cache statistics.
    ///
    /// Memory usage is the JSON-serialized size of every key and value.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats.capacity = self.max_entries;
        stats.memory_usage_bytes = self
            .entries
            .iter()
            .map(|(key, entry)| {
                serde_json::to_vec(key).map(|b| b.len()).unwrap_or(0)
                    + serde_json::to_vec(&entry.value).map(|b| b.len()).unwrap_or(0)
            })
            .sum();
        stats
    }
}
