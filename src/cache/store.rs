//! Size- and age-bounded response store.

use super::entry::CacheEntry;
use super::key::RequestKey;
use bytes::Bytes;
use lru::LruCache;
use std::time::Duration;
use tracing::debug;

/// Default size budget in megabytes.
pub const DEFAULT_SIZE_LIMIT_MB: u64 = 128;

pub(crate) const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Inserts refused because the payload alone exceeded the size limit.
    pub rejected: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Ordered key -> entry store.
///
/// Eviction is strictly by insertion order (oldest first). Lookups never promote an
/// entry, so this is FIFO rather than LRU even though it sits on an `LruCache`.
pub struct ResponseCache {
    entries: LruCache<RequestKey, CacheEntry>,
    size_limit: Option<u64>,
    time_limit: Option<Duration>,
    current_size: u64,
    stats: CacheStats,
}

impl ResponseCache {
    /// `size_limit` is in bytes.
    pub fn new(size_limit: Option<u64>, time_limit: Option<Duration>) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size_limit,
            time_limit,
            current_size: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Return the live entry for `key`. An entry older than the time limit is removed
    /// and reported as a miss.
    pub fn lookup(&mut self, key: &RequestKey) -> Option<&CacheEntry> {
        let expired = match self.entries.peek(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(self.time_limit),
        };

        if expired {
            self.remove(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            debug!(key = %key, "cache entry expired");
            return None;
        }

        self.stats.hits += 1;
        self.entries.peek(key)
    }

    /// Does not count towards stats and does not expire.
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert a response, evicting the oldest entries until it fits.
    ///
    /// A payload larger than the whole size budget is silently not cached.
    pub fn insert(&mut self, key: RequestKey, payload: Bytes, status: u16, url: impl Into<String>) {
        self.insert_entry(CacheEntry::new(key, payload, status, url));
    }

    pub(crate) fn insert_entry(&mut self, entry: CacheEntry) {
        if let Some(limit) = self.size_limit {
            if entry.size_bytes > limit {
                self.stats.rejected += 1;
                debug!(
                    key = %entry.key,
                    size = entry.size_bytes,
                    limit,
                    "response larger than cache size limit; not cached"
                );
                return;
            }
        }

        self.remove(&entry.key);
        if let Some(limit) = self.size_limit {
            self.evict_until_fits(limit.saturating_sub(entry.size_bytes));
        }

        self.current_size += entry.size_bytes;
        self.stats.insertions += 1;
        self.entries.push(entry.key.clone(), entry);
    }

    /// Remove one entry; returns whether it was present.
    pub fn remove(&mut self, key: &RequestKey) -> bool {
        match self.entries.pop(key) {
            Some(old) => {
                self.current_size -= old.size_bytes;
                true
            }
            None => false,
        }
    }

    /// Evict oldest-inserted entries until `current_size <= budget`.
    fn evict_until_fits(&mut self, budget: u64) {
        while self.current_size > budget {
            match self.entries.pop_lru() {
                Some((key, old)) => {
                    self.current_size -= old.size_bytes;
                    self.stats.evictions += 1;
                    debug!(key = %key, size = old.size_bytes, "evicted cache entry");
                }
                None => break,
            }
        }
    }

    /// Drop all entries. Limits are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_size = 0;
    }

    /// Remove every entry older than the time limit.
    pub fn purge_expired(&mut self) -> usize {
        let Some(limit) = self.time_limit else {
            return 0;
        };
        let stale: Vec<RequestKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(Some(limit)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        self.stats.expirations += stale.len() as u64;
        stale.len()
    }

    pub fn current_size_bytes(&self) -> u64 {
        self.current_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    /// Change the size budget; shrinking evicts oldest entries immediately.
    pub fn set_size_limit(&mut self, size_limit: Option<u64>) {
        self.size_limit = size_limit;
        if let Some(limit) = size_limit {
            self.evict_until_fits(limit);
        }
    }

    pub fn set_time_limit(&mut self, time_limit: Option<Duration>) {
        self.time_limit = time_limit;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Entries from oldest to newest inserted.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter().rev().map(|(_, e)| e)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Some(DEFAULT_SIZE_LIMIT_MB * BYTES_PER_MB), None)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.len())
            .field("current_size", &self.current_size)
            .field("size_limit", &self.size_limit)
            .field("time_limit", &self.time_limit)
            .finish()
    }
}
