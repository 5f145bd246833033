//! # Validation Cache
//!
//! Remembers which raw token strings have already passed signature
//! verification so repeat requests can skip the RSA check.
//!
//! ## Entries
//!
//! Entries are keyed by the exact token string. The stored value is the token
//! itself and acts as a liveness marker: the filter only treats a hit as
//! "previously verified" when the value equals the token it looked up. Each
//! entry also carries an eviction deadline (`exp + grace`) computed from the
//! decoded claims at store time.
//!
//! ## Eviction
//!
//! - **Lazy**: on a hit the filter checks the deadline and removes the entry if
//!   it has passed. The current request is still admitted; the next one with
//!   the same token re-verifies from scratch.
//! - **Sweep**: a [`Sweeper`] thread calls [`TokenCache::purge_expired`] at a
//!   fixed interval, bounding growth even when nobody reads.
//!
//! ## Capacity
//!
//! [`TokenCache::try_store`] only inserts below the configured capacity. The
//! trait's default implementation checks `size()` and then stores, which two
//! racing requests can both pass; [`MemoryTokenCache`] overrides it with an
//! atomic reservation so its population never exceeds the capacity.

mod memory;
mod sweeper;

pub use memory::MemoryTokenCache;
pub use sweeper::Sweeper;

use std::sync::Arc;

/// Default interval between background sweeps
pub const DEFAULT_PURGE_INTERVAL_MS: u64 = 10_000;

/// Cache statistics for observability and tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries removed (lazy eviction, explicit removal, or sweep)
    pub evictions: u64,
    /// Stores refused because the cache was full
    pub rejected_stores: u64,
    /// Current number of entries in cache
    pub size: usize,
    /// Maximum capacity of cache
    pub capacity: usize,
}

impl CacheStats {
    /// Cache hit rate as a percentage
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Shared store of previously verified tokens.
///
/// Every operation is individually safe under concurrent use from unrelated
/// requests; sequences of operations are not atomic.
pub trait TokenCache: Send + Sync {
    /// Value stored for `key`, if any
    fn lookup(&self, key: &str) -> Option<Arc<str>>;

    /// Insert or replace an entry regardless of population
    fn store(&self, key: &str, value: Arc<str>, evict_after: Option<i64>);

    /// Insert only while the population is below `capacity`.
    ///
    /// Returns `true` if the entry was stored. The default implementation is
    /// a non-atomic size check followed by a store, so concurrent callers may
    /// overshoot `capacity` by the number of racing requests.
    fn try_store(
        &self,
        key: &str,
        value: Arc<str>,
        evict_after: Option<i64>,
        capacity: usize,
    ) -> bool {
        if self.size() < capacity {
            self.store(key, value, evict_after);
            true
        } else {
            false
        }
    }

    /// Remove an entry, returning whether one was present
    fn remove(&self, key: &str) -> bool;

    /// Current population
    fn size(&self) -> usize;

    /// Remove every entry whose deadline is before `now`, returning the count
    fn purge_expired(&self, now: i64) -> usize;

    /// Counters for observability
    fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.size(),
            ..CacheStats::default()
        }
    }
}
