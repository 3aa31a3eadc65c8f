//! Chunk and file-entry types.
//!
//! A chunk is a fixed-size aligned byte run from one S3 object; the last
//! chunk of an object may be short. A file entry groups the cached chunks
//! of a single key and carries the key's zone assignment.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, RwLock};
use std::time::Instant;

use bytes::Bytes;

/// Which eviction discipline a cached file is subject to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheZone {
    /// Accessed at least once; evicted by least-recently-touched chunk.
    Hot,
    /// Speculatively loaded; evicted in insertion order.
    Prefetch,
}

impl std::fmt::Display for CacheZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheZone::Hot => write!(f, "HOT"),
            CacheZone::Prefetch => write!(f, "PREFETCH"),
        }
    }
}

static CLOCK_EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic microseconds since process start.
pub fn now_micros() -> u64 {
    CLOCK_EPOCH.elapsed().as_micros() as u64
}

/// A single cached byte run.
///
/// The payload is immutable; only the access timestamp moves. Cloning is
/// cheap (the payload is reference-counted), so lookups hand out snapshots.
#[derive(Debug)]
pub struct Chunk {
    payload: Bytes,
    last_access_us: AtomicU64,
}

impl Chunk {
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            last_access_us: AtomicU64::new(now_micros()),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn last_access_us(&self) -> u64 {
        self.last_access_us.load(Ordering::Acquire)
    }

    /// Refresh the access timestamp.
    pub fn touch(&self) {
        self.last_access_us.store(now_micros(), Ordering::Release);
    }
}

impl Clone for Chunk {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            last_access_us: AtomicU64::new(self.last_access_us()),
        }
    }
}

/// A key's presence in the cache: its chunks plus the zone assignment.
///
/// The chunk map has its own lock so concurrent readers of one file do not
/// serialize against readers of another. The zone cell is only written
/// while the store-wide lock is held exclusively.
#[derive(Debug)]
pub struct FileEntry {
    key: String,
    zone: RwLock<CacheZone>,
    chunks: RwLock<BTreeMap<u64, Chunk>>,
}

impl FileEntry {
    pub fn new(key: String, zone: CacheZone) -> Self {
        Self {
            key,
            zone: RwLock::new(zone),
            chunks: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn zone(&self) -> CacheZone {
        *self.zone.read().unwrap()
    }

    pub(crate) fn set_zone(&self, zone: CacheZone) {
        *self.zone.write().unwrap() = zone;
    }

    /// Insert or overwrite the chunk at `offset`, returning the byte size of
    /// the chunk it replaced (0 if the slot was empty).
    pub(crate) fn insert_chunk(&self, offset: u64, payload: Bytes) -> u64 {
        let mut chunks = self.chunks.write().unwrap();
        let old = chunks.insert(offset, Chunk::new(payload));
        old.map(|c| c.len() as u64).unwrap_or(0)
    }

    /// Snapshot the chunk at `offset` without updating recency.
    pub fn chunk_at(&self, offset: u64) -> Option<Chunk> {
        self.chunks.read().unwrap().get(&offset).cloned()
    }

    /// Byte size of the chunk at `offset`, if present.
    pub fn chunk_len(&self, offset: u64) -> Option<u64> {
        self.chunks.read().unwrap().get(&offset).map(|c| c.len() as u64)
    }

    /// Refresh the access timestamp of the chunk at `offset`.
    /// Returns false if no such chunk is cached.
    pub(crate) fn touch_chunk(&self, offset: u64) -> bool {
        match self.chunks.read().unwrap().get(&offset) {
            Some(chunk) => {
                chunk.touch();
                true
            }
            None => false,
        }
    }

    /// Sum of payload sizes across the entry's chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks
            .read()
            .unwrap()
            .values()
            .map(|c| c.len() as u64)
            .sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    /// The entry's age for LRU purposes: the least-recently-touched chunk.
    pub fn oldest_access_us(&self) -> Option<u64> {
        self.chunks
            .read()
            .unwrap()
            .values()
            .map(|c| c.last_access_us())
            .min()
    }
}
