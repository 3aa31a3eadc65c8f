//! Read façade.
//!
//! Translates file reads into chunk lookups, synchronous miss-fills, and
//! access notifications. The kernel filesystem binding (an external layer)
//! calls these methods from its operation callbacks; nothing here touches
//! the kernel API.
//!
//! The namespace is flat: every key is a regular file directly under the
//! mount root.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::debug;

use crate::cache::store::CacheStore;
use crate::config::DEFAULT_FILE_SIZE;
use crate::predictor::Predictor;
use crate::transfer::pool::WorkerPool;
use crate::transfer::queue::Priority;

const ENOENT: i32 = 2;
const EIO: i32 = 5;
const EROFS: i32 = 30;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file: {0}")]
    NotFound(String),

    #[error("filesystem is read-only")]
    ReadOnly,

    #[error("i/o error reading {0}")]
    Io(String),
}

impl FsError {
    /// Errno for the kernel binding to return from its callback.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => ENOENT,
            FsError::ReadOnly => EROFS,
            FsError::Io(_) => EIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

/// Attributes for `getattr`.
#[derive(Debug, Clone)]
pub struct FileAttr {
    pub kind: FileKind,
    pub size: u64,
    pub mode: u32,
}

/// Strip the leading slash from a mount-relative path to get the store key.
pub fn path_to_key(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

pub struct ShardFs {
    cache: Arc<CacheStore>,
    pool: Arc<WorkerPool>,
    predictor: Arc<Predictor>,
    chunk_size: u64,
    /// key → advertised size. Seeded by the startup listing, extended at
    /// `open` with a placeholder, refined when a read observes end-of-object.
    metadata: RwLock<HashMap<String, u64>>,
}

impl ShardFs {
    pub fn new(
        cache: Arc<CacheStore>,
        pool: Arc<WorkerPool>,
        predictor: Arc<Predictor>,
        chunk_size: u64,
    ) -> Self {
        Self {
            cache,
            pool,
            predictor,
            chunk_size,
            metadata: RwLock::new(HashMap::new()),
        }
    }

    /// Record a key with a known size (startup listing).
    pub fn register(&self, key: &str, size: u64) {
        self.metadata.write().unwrap().insert(key.to_string(), size);
    }

    /// Open a file for reading. Registers the key with a placeholder size if
    /// the listing did not surface it, and notifies the predictor.
    pub fn open(&self, path: &str, read_only: bool) -> Result<(), FsError> {
        if !read_only {
            return Err(FsError::ReadOnly);
        }

        let key = path_to_key(path);
        self.metadata
            .write()
            .unwrap()
            .entry(key.to_string())
            .or_insert(DEFAULT_FILE_SIZE);

        self.predictor.on_file_accessed(key);
        Ok(())
    }

    /// Attributes for a path: the root is a directory, known keys are
    /// read-only regular files, everything else does not exist.
    pub fn getattr(&self, path: &str) -> Option<FileAttr> {
        if path == "/" {
            return Some(FileAttr {
                kind: FileKind::Directory,
                size: 0,
                mode: 0o555,
            });
        }

        let key = path_to_key(path);
        self.metadata.read().unwrap().get(key).map(|&size| FileAttr {
            kind: FileKind::Regular,
            size,
            mode: 0o444,
        })
    }

    /// The current key set, in stable order.
    pub fn readdir(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.metadata.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn release(&self, _path: &str) {}

    /// Read `len` bytes of `key` starting at `offset`.
    ///
    /// Walks chunk by chunk: a miss submits an URGENT download and blocks on
    /// its completion handle, a hit refreshes recency (promoting PREFETCH
    /// data to HOT). A chunk shorter than the chunk size marks end-of-object:
    /// the walk stops there and the advertised size is refined. Returns fewer
    /// bytes than requested only at end-of-object.
    pub async fn read(&self, key: &str, offset: u64, len: usize) -> Result<Bytes, FsError> {
        let mut out = BytesMut::with_capacity(len.min(self.chunk_size as usize));
        let mut pos = offset;
        let mut remaining = len as u64;

        while remaining > 0 {
            let chunk_offset = (pos / self.chunk_size) * self.chunk_size;
            let within = (pos - chunk_offset) as usize;

            let chunk = match self.cache.get(key, chunk_offset) {
                Some(chunk) => chunk,
                None => {
                    debug!(key, chunk_offset, "cache miss");
                    let handle = self
                        .pool
                        .submit(key, chunk_offset, self.chunk_size, Priority::Urgent);
                    if !handle.wait().await {
                        return Err(FsError::Io(key.to_string()));
                    }
                    self.cache
                        .get(key, chunk_offset)
                        .ok_or_else(|| FsError::Io(key.to_string()))?
                }
            };

            self.cache.access(key, chunk_offset);

            let payload = chunk.payload();
            if within >= payload.len() {
                // Reading at or past end-of-object yields no further bytes,
                // but a short chunk still pins down the real size.
                if (payload.len() as u64) < self.chunk_size {
                    self.refine_size(key, chunk_offset + payload.len() as u64);
                }
                break;
            }

            let take = remaining.min((payload.len() - within) as u64) as usize;
            out.extend_from_slice(&payload[within..within + take]);
            pos += take as u64;
            remaining -= take as u64;

            if (payload.len() as u64) < self.chunk_size {
                self.refine_size(key, chunk_offset + payload.len() as u64);
                break;
            }
        }

        Ok(out.freeze())
    }

    fn refine_size(&self, key: &str, size: u64) {
        let mut metadata = self.metadata.write().unwrap();
        let slot = metadata.entry(key.to_string()).or_insert(size);
        if *slot != size {
            debug!(key, size, "file size refined");
            *slot = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::client::{Listing, RemoteError, RemoteStore};
    use async_trait::async_trait;

    struct NullStore;

    #[async_trait]
    impl RemoteStore for NullStore {
        async fn get_range(&self, key: &str, _offset: u64, _len: u64) -> Result<Bytes, RemoteError> {
            Err(RemoteError::NotFound(key.to_string()))
        }

        async fn list(&self, _max_keys: usize) -> Result<Listing, RemoteError> {
            Ok(Listing::default())
        }
    }

    fn test_fs() -> ShardFs {
        let cache = Arc::new(CacheStore::new(1024 * 1024));
        let pool = WorkerPool::new(Arc::clone(&cache), Arc::new(NullStore), 1);
        let predictor = Predictor::new(Arc::clone(&cache), Arc::clone(&pool), 3, 4096);
        ShardFs::new(cache, pool, predictor, 4096)
    }

    #[test]
    fn path_to_key_strips_leading_slash() {
        assert_eq!(path_to_key("/shard_000.bin"), "shard_000.bin");
        assert_eq!(path_to_key("shard_000.bin"), "shard_000.bin");
    }

    #[test]
    fn root_is_a_directory() {
        let fs = test_fs();
        let attr = fs.getattr("/").unwrap();
        assert_eq!(attr.kind, FileKind::Directory);
    }

    #[test]
    fn unknown_path_has_no_attributes() {
        let fs = test_fs();
        assert!(fs.getattr("/ghost.bin").is_none());
    }

    #[test]
    fn open_rejects_write_modes() {
        let fs = test_fs();
        let err = fs.open("/shard_000.bin", false).unwrap_err();
        assert!(matches!(err, FsError::ReadOnly));
        assert_eq!(err.errno(), EROFS);
    }

    #[test]
    fn open_registers_placeholder_size() {
        let fs = test_fs();
        fs.open("/shard_000.bin", true).unwrap();

        let attr = fs.getattr("/shard_000.bin").unwrap();
        assert_eq!(attr.kind, FileKind::Regular);
        assert_eq!(attr.size, DEFAULT_FILE_SIZE);
        assert_eq!(attr.mode, 0o444);
    }

    #[test]
    fn open_keeps_listed_size() {
        let fs = test_fs();
        fs.register("shard_000.bin", 12345);
        fs.open("/shard_000.bin", true).unwrap();
        assert_eq!(fs.getattr("/shard_000.bin").unwrap().size, 12345);
    }

    #[test]
    fn readdir_lists_registered_keys() {
        let fs = test_fs();
        fs.register("b.bin", 1);
        fs.register("a.bin", 1);
        assert_eq!(fs.readdir(), vec!["a.bin".to_string(), "b.bin".to_string()]);
    }
}
