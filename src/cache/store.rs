//! Byte-budgeted two-zone cache store.
//!
//! Admission evicts until the new payload fits: PREFETCH entries go first
//! (oldest-inserted whole file), then HOT entries by least-recently-touched
//! chunk. A key accessed while in PREFETCH is promoted to HOT, making
//! proven-useful data durable until displaced by newer useful data.
//!
//! Lock order is store-wide then per-entry; no lock is held across I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::cache::chunk::{CacheZone, Chunk, FileEntry};

/// Point-in-time occupancy snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub hot_bytes: u64,
    pub prefetch_bytes: u64,
    pub file_count: usize,
    pub chunk_count: usize,
}

struct StoreInner {
    current_bytes: u64,
    files: HashMap<String, Arc<FileEntry>>,
    /// HOT keys in insertion order; scanned for the LRU victim.
    hot_ring: VecDeque<String>,
    /// PREFETCH keys in insertion order; the front is the next victim.
    prefetch_ring: VecDeque<String>,
}

impl StoreInner {
    /// Evict until `need` more bytes fit under `max_bytes`, never touching
    /// `exempt`. Stops early when nothing evictable remains, which is what
    /// admits a single oversized chunk.
    fn evict_for(&mut self, need: u64, max_bytes: u64, exempt: Option<&str>) {
        while self.current_bytes + need > max_bytes {
            let fifo_victim = self
                .prefetch_ring
                .iter()
                .position(|key| Some(key.as_str()) != exempt);

            if let Some(pos) = fifo_victim {
                if let Some(key) = self.prefetch_ring.remove(pos) {
                    self.drop_entry(&key);
                }
            } else if !self.evict_lru_hot(exempt) {
                break;
            }
        }
    }

    /// Remove the HOT entry whose least-recently-touched chunk is oldest.
    /// Ties resolve to the earlier ring position (oldest-inserted). Returns
    /// false when no eligible victim exists.
    fn evict_lru_hot(&mut self, exempt: Option<&str>) -> bool {
        let mut victim: Option<(usize, u64)> = None;
        for (idx, key) in self.hot_ring.iter().enumerate() {
            if Some(key.as_str()) == exempt {
                continue;
            }
            let Some(entry) = self.files.get(key) else {
                continue;
            };
            let age = entry.oldest_access_us().unwrap_or(0);
            if victim.map(|(_, best)| age < best).unwrap_or(true) {
                victim = Some((idx, age));
            }
        }

        match victim {
            Some((idx, _)) => {
                if let Some(key) = self.hot_ring.remove(idx) {
                    self.drop_entry(&key);
                }
                true
            }
            None => false,
        }
    }

    fn drop_entry(&mut self, key: &str) {
        if let Some(entry) = self.files.remove(key) {
            let freed = entry.total_bytes();
            self.current_bytes = self.current_bytes.saturating_sub(freed);
            debug!(key, freed, zone = %entry.zone(), "evicted");
        }
    }
}

/// The chunk cache shared by workers, the predictor, and the read façade.
pub struct CacheStore {
    max_bytes: u64,
    inner: RwLock<StoreInner>,
}

impl CacheStore {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            inner: RwLock::new(StoreInner {
                current_bytes: 0,
                files: HashMap::new(),
                hot_ring: VecDeque::new(),
                prefetch_ring: VecDeque::new(),
            }),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Admit a chunk, evicting first if it would not fit. Admission never
    /// fails; a chunk larger than the whole budget empties the cache and is
    /// admitted anyway.
    pub fn insert(&self, key: &str, offset: u64, payload: Bytes, zone: CacheZone) {
        let mut inner = self.inner.write().unwrap();

        let new_len = payload.len() as u64;
        let displaced = inner
            .files
            .get(key)
            .and_then(|entry| entry.chunk_len(offset))
            .unwrap_or(0);
        let need = new_len.saturating_sub(displaced);
        inner.evict_for(need, self.max_bytes, None);

        // Eviction may have removed the destination entry; re-resolve it.
        let entry = if let Some(entry) = inner.files.get(key) {
            Arc::clone(entry)
        } else {
            let entry = Arc::new(FileEntry::new(key.to_string(), zone));
            inner.files.insert(key.to_string(), Arc::clone(&entry));
            match zone {
                CacheZone::Hot => inner.hot_ring.push_back(key.to_string()),
                CacheZone::Prefetch => inner.prefetch_ring.push_back(key.to_string()),
            }
            entry
        };

        let old = entry.insert_chunk(offset, payload);
        inner.current_bytes = inner.current_bytes + new_len - old;

        // If eviction dropped the destination entry, the delta the reservation
        // was based on no longer exists; restore the budget invariant without
        // displacing the chunk just admitted.
        if inner.current_bytes > self.max_bytes {
            inner.evict_for(0, self.max_bytes, Some(key));
        }
    }

    /// Snapshot the chunk at `(key, offset)`. Does not update recency.
    pub fn get(&self, key: &str, offset: u64) -> Option<Chunk> {
        let inner = self.inner.read().unwrap();
        inner.files.get(key)?.chunk_at(offset)
    }

    /// Record a hit: refresh the chunk timestamp and promote the entry out
    /// of PREFETCH on first access.
    pub fn access(&self, key: &str, offset: u64) {
        let mut inner = self.inner.write().unwrap();

        let Some(entry) = inner.files.get(key).map(Arc::clone) else {
            return;
        };
        entry.touch_chunk(offset);

        if entry.zone() == CacheZone::Prefetch {
            if let Some(pos) = inner.prefetch_ring.iter().position(|k| k == key) {
                inner.prefetch_ring.remove(pos);
            }
            inner.hot_ring.push_back(key.to_string());
            entry.set_zone(CacheZone::Hot);
            debug!(key, "promoted to HOT");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().unwrap().files.contains_key(key)
    }

    /// The key's current zone, or `None` if it is not cached.
    pub fn zone_of(&self, key: &str) -> Option<CacheZone> {
        let inner = self.inner.read().unwrap();
        inner.files.get(key).map(|entry| entry.zone())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap();

        let mut stats = CacheStats {
            current_bytes: inner.current_bytes,
            max_bytes: self.max_bytes,
            file_count: inner.files.len(),
            ..Default::default()
        };

        for entry in inner.files.values() {
            let size = entry.total_bytes();
            stats.chunk_count += entry.chunk_count();
            match entry.zone() {
                CacheZone::Hot => stats.hot_bytes += size,
                CacheZone::Prefetch => stats.prefetch_bytes += size,
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize, fill: u8) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    #[test]
    fn get_after_insert_returns_payload() {
        let cache = CacheStore::new(8 * 1024 * 1024);
        cache.insert("file1.bin", 0, payload(1024, b'A'), CacheZone::Hot);

        let chunk = cache.get("file1.bin", 0).unwrap();
        assert_eq!(chunk.len(), 1024);
        assert_eq!(chunk.payload()[0], b'A');
    }

    #[test]
    fn get_misses_on_unknown_offset() {
        let cache = CacheStore::new(8 * 1024 * 1024);
        cache.insert("file1.bin", 0, payload(1024, b'A'), CacheZone::Hot);
        assert!(cache.get("file1.bin", 4096).is_none());
        assert!(cache.get("other.bin", 0).is_none());
    }

    #[test]
    fn access_promotes_prefetch_to_hot() {
        let cache = CacheStore::new(8 * 1024 * 1024);
        cache.insert("file2.bin", 0, payload(1024, b'B'), CacheZone::Prefetch);
        assert_eq!(cache.zone_of("file2.bin"), Some(CacheZone::Prefetch));

        cache.access("file2.bin", 0);
        assert_eq!(cache.zone_of("file2.bin"), Some(CacheZone::Hot));

        // Further accesses keep it HOT.
        cache.access("file2.bin", 0);
        assert_eq!(cache.zone_of("file2.bin"), Some(CacheZone::Hot));
    }

    #[test]
    fn zone_of_missing_key_is_none() {
        let cache = CacheStore::new(1024);
        assert_eq!(cache.zone_of("ghost.bin"), None);
    }

    #[test]
    fn occupancy_tracks_inserts_and_overwrites() {
        let cache = CacheStore::new(1024 * 1024);
        cache.insert("f", 0, payload(500, 0), CacheZone::Hot);
        cache.insert("f", 4096, payload(300, 0), CacheZone::Hot);
        assert_eq!(cache.stats().current_bytes, 800);

        // Overwrite adjusts by the delta, not the sum.
        cache.insert("f", 0, payload(200, 0), CacheZone::Hot);
        assert_eq!(cache.stats().current_bytes, 500);

        let stats = cache.stats();
        assert_eq!(stats.hot_bytes + stats.prefetch_bytes, stats.current_bytes);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.file_count, 1);
    }

    #[test]
    fn prefetch_evicted_before_hot() {
        let cache = CacheStore::new(2048);
        cache.insert("hot.bin", 0, payload(1024, 0), CacheZone::Hot);
        cache.insert("spec.bin", 0, payload(1024, 0), CacheZone::Prefetch);

        // Admitting a third kilobyte must displace the speculative entry.
        cache.insert("next.bin", 0, payload(1024, 0), CacheZone::Hot);
        assert!(cache.contains("hot.bin"));
        assert!(!cache.contains("spec.bin"));
        assert!(cache.contains("next.bin"));
    }

    #[test]
    fn hot_eviction_follows_chunk_recency() {
        let cache = CacheStore::new(3 * 1024);
        cache.insert("f1", 0, payload(1024, 0), CacheZone::Hot);
        cache.insert("f2", 0, payload(1024, 0), CacheZone::Hot);
        cache.insert("f3", 0, payload(1024, 0), CacheZone::Hot);

        // Touch f1 so f2 becomes the least-recently-touched entry.
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.access("f1", 0);

        cache.insert("f4", 0, payload(1024, 0), CacheZone::Hot);
        assert!(cache.contains("f1"));
        assert!(!cache.contains("f2"));
        assert!(cache.contains("f3"));
        assert!(cache.contains("f4"));
    }

    #[test]
    fn exact_fit_evicts_single_entry() {
        let budget = 3 * 1024;
        let cache = CacheStore::new(budget);
        cache.insert("f1", 0, payload(1024, 0), CacheZone::Hot);
        cache.insert("f2", 0, payload(1024, 0), CacheZone::Hot);
        cache.insert("f3", 0, payload(1024, 0), CacheZone::Hot);

        // The (B/c)+1-th distinct chunk evicts exactly one entry.
        cache.insert("f4", 0, payload(1024, 0), CacheZone::Hot);
        let stats = cache.stats();
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.current_bytes, budget);
    }

    #[test]
    fn oversized_chunk_empties_cache_and_is_admitted() {
        let cache = CacheStore::new(1024);
        cache.insert("small.bin", 0, payload(512, 0), CacheZone::Hot);

        cache.insert("huge.bin", 0, payload(4096, 0), CacheZone::Hot);
        assert!(!cache.contains("small.bin"));
        assert!(cache.contains("huge.bin"));
        assert_eq!(cache.stats().current_bytes, 4096);
    }

    #[test]
    fn reinserting_same_chunk_does_not_evict_neighbors() {
        let cache = CacheStore::new(2048);
        cache.insert("a", 0, payload(1024, 0), CacheZone::Hot);
        cache.insert("b", 0, payload(1024, 0), CacheZone::Hot);

        // Same key/offset/size again: true delta is zero.
        cache.insert("a", 0, payload(1024, 1), CacheZone::Hot);
        assert!(cache.contains("a"));
        assert!(cache.contains("b"));
        assert_eq!(cache.stats().current_bytes, 2048);
    }
}
