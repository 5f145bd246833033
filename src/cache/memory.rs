use super::{CacheStats, TokenCache};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<str>,
    // exp + grace; None for tokens without an expiry claim
    evict_after: Option<i64>,
}

/// In-process validation cache backed by a sharded concurrent map.
///
/// Reads, writes and removals from unrelated requests only contend on the
/// shard holding the key. Population is tracked with an atomic reservation
/// counter so [`TokenCache::try_store`] is a strict bound.
pub struct MemoryTokenCache {
    entries: DashMap<Arc<str>, CacheEntry>,
    capacity: usize,
    reserved: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    rejected_stores: AtomicU64,
}

impl MemoryTokenCache {
    /// Create a cache reporting `capacity` as its maximum size.
    ///
    /// The capacity here is informational; the bound enforced on insert is
    /// the one passed to [`TokenCache::try_store`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity.min(4096)),
            capacity,
            reserved: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rejected_stores: AtomicU64::new(0),
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.reserved.store(0, Ordering::SeqCst);
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
    }

    fn release(&self, n: usize) {
        if n > 0 {
            // Never wrap below zero if a clear() raced a removal.
            self.reserved
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| {
                    Some(r.saturating_sub(n))
                })
                .unwrap_or_else(|prev| prev);
        }
    }
}

impl TokenCache for MemoryTokenCache {
    fn lookup(&self, key: &str) -> Option<Arc<str>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn store(&self, key: &str, value: Arc<str>, evict_after: Option<i64>) {
        let previous = self
            .entries
            .insert(Arc::from(key), CacheEntry { value, evict_after });
        if previous.is_none() {
            self.reserved.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn try_store(
        &self,
        key: &str,
        value: Arc<str>,
        evict_after: Option<i64>,
        capacity: usize,
    ) -> bool {
        let reserved = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            self.rejected_stores.fetch_add(1, Ordering::Relaxed);
            debug!(capacity, "token cache full; not storing token");
            return false;
        }
        let previous = self
            .entries
            .insert(Arc::from(key), CacheEntry { value, evict_after });
        if previous.is_some() {
            // Replaced an existing entry: population did not grow.
            self.release(1);
        }
        true
    }

    fn remove(&self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.release(1);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn purge_expired(&self, now: i64) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| match entry.evict_after {
            Some(deadline) if now > deadline => {
                removed += 1;
                false
            }
            _ => true,
        });
        self.release(removed);
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            rejected_stores: self.rejected_stores.load(Ordering::Relaxed),
            size: self.entries.len(),
            capacity: self.capacity,
        }
    }
}
