//! Shared fixtures for integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use shardfs::remote::client::{Listing, ObjectInfo, RemoteError, RemoteStore};

/// Deterministic content for byte `i` of any fixture object.
pub fn pattern_byte(i: usize) -> u8 {
    (i % 251) as u8
}

/// In-memory remote store with range-GET semantics matching S3: requests
/// past end-of-object return the bytes that exist (possibly none).
pub struct MemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    gets: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            gets: AtomicU64::new(0),
        }
    }

    pub fn with_objects(specs: &[(&str, usize)]) -> Self {
        let mut store = Self::new();
        for (key, len) in specs {
            store.put_patterned(key, *len);
        }
        store
    }

    pub fn put_patterned(&mut self, key: &str, len: usize) {
        let data: Vec<u8> = (0..len).map(pattern_byte).collect();
        self.objects.insert(key.to_string(), data);
    }

    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes, RemoteError> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        let data = self
            .objects
            .get(key)
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;

        let start = (offset as usize).min(data.len());
        let end = (offset as usize).saturating_add(len as usize).min(data.len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    async fn list(&self, max_keys: usize) -> Result<Listing, RemoteError> {
        let objects: Vec<ObjectInfo> = self
            .objects
            .iter()
            .take(max_keys)
            .map(|(key, data)| ObjectInfo {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect();

        Ok(Listing {
            truncated: self.objects.len() > max_keys,
            objects,
        })
    }
}

/// Poll `condition` until it holds or the timeout expires.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: std::time::Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    condition()
}
