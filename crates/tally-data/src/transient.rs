//! Byte-bounded cache of loaded event tables.
//!
//! Keys are fingerprints of (data source, property set); values are shared
//! tables. Capacity is bounded by approximate table bytes, not entry count;
//! the least recently used table is evicted first.
//! One instance is owned by each batch job and never shared across workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tally_core::{Fingerprint, Result};

use crate::table::Table;

/// Configuration for the transient cache.
#[derive(Debug, Clone, Copy)]
pub struct TransientCacheConfig {
    /// Maximum total bytes of tables to keep. Default: 512 MiB.
    pub max_bytes: usize,
    /// When `false`, `get`/`insert` are no-ops.
    pub enabled: bool,
}

impl Default for TransientCacheConfig {
    fn default() -> Self {
        Self { max_bytes: 512 * 1024 * 1024, enabled: true }
    }
}

impl TransientCacheConfig {
    /// A disabled (no-op) cache config.
    pub fn disabled() -> Self {
        Self { max_bytes: 0, enabled: false }
    }
}

struct Slot {
    table: Arc<Table>,
    size: usize,
    last_used: u64,
}

/// Tables keyed by fingerprint, each stamped with the tick of its last use.
/// Eviction drops the entry with the oldest stamp.
#[derive(Default)]
struct Inner {
    slots: HashMap<Fingerprint, Slot>,
    tick: u64,
    bytes: usize,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &Fingerprint) -> Option<Arc<Table>> {
        let now = self.touch();
        match self.slots.get_mut(key) {
            Some(slot) => {
                self.hits += 1;
                slot.last_used = now;
                Some(Arc::clone(&slot.table))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.slots.iter().min_by_key(|(_, s)| s.last_used).map(|(k, _)| *k)
        else {
            return false;
        };
        if let Some(slot) = self.slots.remove(&oldest) {
            self.bytes -= slot.size;
            tracing::debug!(key = ?oldest, size = slot.size, "evicted table");
        }
        true
    }

    fn insert(&mut self, key: Fingerprint, table: Arc<Table>, max_bytes: usize) {
        let size = table.approx_bytes();
        if size > max_bytes {
            tracing::debug!(key = ?key, size, "table larger than transient cache, not cached");
            return;
        }
        if let Some(old) = self.slots.remove(&key) {
            self.bytes -= old.size;
        }
        while self.bytes + size > max_bytes && self.evict_oldest() {}
        let last_used = self.touch();
        self.slots.insert(key, Slot { table, size, last_used });
        self.bytes += size;
    }
}

/// Thread-safe, byte-bounded cache of loaded tables.
pub struct TransientCache {
    inner: Mutex<Inner>,
    config: TransientCacheConfig,
}

impl TransientCache {
    /// Create a cache with the given configuration.
    pub fn new(config: TransientCacheConfig) -> Self {
        Self { inner: Mutex::default(), config }
    }

    /// Look up a table. `None` on miss or when disabled.
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<Table>> {
        if !self.config.enabled {
            return None;
        }
        self.inner.lock().expect("transient cache mutex poisoned").get(key)
    }

    /// Insert a table, returning the shared handle.
    pub fn insert(&self, key: Fingerprint, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        if self.config.enabled {
            self.inner.lock().expect("transient cache mutex poisoned").insert(
                key,
                Arc::clone(&table),
                self.config.max_bytes,
            );
        }
        table
    }

    /// Cached table, or load it with `f` and cache the result.
    pub fn get_or_insert<F>(&self, key: &Fingerprint, f: F) -> Result<Arc<Table>>
    where
        F: FnOnce() -> Result<Table>,
    {
        if let Some(cached) = self.get(key) {
            tracing::debug!(key = ?key, "transient cache hit");
            return Ok(cached);
        }
        let table = f()?;
        Ok(self.insert(*key, table))
    }

    /// Current occupancy and lookup counts.
    pub fn stats(&self) -> TransientCacheStats {
        let inner = self.inner.lock().expect("transient cache mutex poisoned");
        TransientCacheStats {
            entries: inner.slots.len(),
            bytes: inner.bytes,
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// Drop every cached table.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("transient cache mutex poisoned");
        inner.slots.clear();
        inner.bytes = 0;
    }
}

impl Default for TransientCache {
    fn default() -> Self {
        Self::new(TransientCacheConfig::default())
    }
}

/// Snapshot of a [`TransientCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientCacheStats {
    /// Number of cached tables.
    pub entries: usize,
    /// Approximate bytes held.
    pub bytes: usize,
    /// Lookups that found a table.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> Fingerprint {
        Fingerprint::of_bytes(&[n])
    }

    /// One column named "x" with `rows` rows: 1 + 8 * rows bytes.
    fn table(rows: usize) -> Table {
        Table::from_columns([("x", vec![0.0; rows])]).unwrap()
    }

    fn cache(max_bytes: usize) -> TransientCache {
        TransientCache::new(TransientCacheConfig { max_bytes, enabled: true })
    }

    #[test]
    fn insert_and_get() {
        let c = cache(1024);
        assert!(c.get(&key(1)).is_none());
        c.insert(key(1), table(2));
        assert_eq!(c.get(&key(1)).unwrap().n_rows(), 2);
        let s = c.stats();
        assert_eq!((s.entries, s.bytes, s.hits, s.misses), (1, 17, 1, 1));
    }

    #[test]
    fn evicts_least_recently_used() {
        let c = cache(40);
        c.insert(key(1), table(2));
        c.insert(key(2), table(2));
        assert!(c.get(&key(1)).is_some()); // key 2 becomes LRU
        c.insert(key(3), table(2));
        assert!(c.get(&key(2)).is_none());
        assert!(c.get(&key(1)).is_some());
        assert!(c.get(&key(3)).is_some());
    }

    #[test]
    fn oversized_and_disabled() {
        let c = cache(8);
        assert_eq!(c.insert(key(1), table(4)).n_rows(), 4);
        assert_eq!(c.stats().entries, 0);

        let d = TransientCache::new(TransientCacheConfig::disabled());
        d.insert(key(1), table(1));
        assert!(d.get(&key(1)).is_none());
    }

    #[test]
    fn get_or_insert_loads_once() {
        let c = cache(1024);
        let mut calls = 0;
        for _ in 0..3 {
            let t = c
                .get_or_insert(&key(7), || {
                    calls += 1;
                    Ok(table(3))
                })
                .unwrap();
            assert_eq!(t.n_rows(), 3);
        }
        assert_eq!(calls, 1);
        assert_eq!(c.stats().hits, 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let c = cache(1024);
        let r = c.get_or_insert(&key(1), || Err(tally_core::Error::Data("boom".into())));
        assert!(r.is_err());
        assert!(c.get(&key(1)).is_none());
    }

    #[test]
    fn clear_empties() {
        let c = cache(1024);
        c.insert(key(1), table(1));
        c.clear();
        assert_eq!(c.stats().entries, 0);
        assert_eq!(c.stats().bytes, 0);
    }
}
