//! Cache Entry Module
//!
//! Defines a stored value together with its TTL, tags and access record, so
//! an entry can never exist without its access metadata.

use std::time::Duration;

use tokio::time::Instant;

// == Access Record ==
/// Read statistics for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    /// Total successful reads
    pub hit_count: u64,
    /// Time of the most recent read, or of the last write if never read
    pub last_accessed_at: Instant,
    /// Store-wide touch sequence; orders accesses that share an instant
    pub(crate) touch_seq: u64,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Insertion or last overwrite time
    pub stored_at: Instant,
    /// Lifetime after `stored_at`; `None` never expires
    pub ttl: Option<Duration>,
    /// Labels for grouped invalidation
    pub tags: Vec<String>,
    pub access: AccessRecord,
    /// Store-wide write sequence; orders writes that share an instant
    pub(crate) write_seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// A zero TTL is normalised to `None`.
    pub fn new(value: V, ttl: Option<Duration>, tags: Vec<String>, now: Instant, seq: u64) -> Self {
        Self {
            value,
            stored_at: now,
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            tags,
            access: AccessRecord {
                hit_count: 0,
                last_accessed_at: now,
                touch_seq: seq,
            },
            write_seq: seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has outlived its TTL at `now`.
    ///
    /// Expired means strictly more than `ttl` has elapsed since `stored_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.stored_at) > ttl,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if the entry never expires.
    ///
    /// Returns `Some(Duration::ZERO)` once the TTL has elapsed.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.ttl.map(|ttl| {
            let elapsed = Instant::now().saturating_duration_since(self.stored_at);
            ttl.saturating_sub(elapsed)
        })
    }

    /// Whether this entry carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Records a successful read.
    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        self.access.hit_count += 1;
        self.access.last_accessed_at = now;
        self.access.touch_seq = seq;
    }
}
