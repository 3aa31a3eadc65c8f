//! Worker pool: drains the task queue, performs ranged downloads, and
//! admits results into the cache.
//!
//! Urgent downloads land in the HOT zone (a reader proved it useful by
//! waiting); everything else is speculative and lands in PREFETCH. Each
//! task's completion handle is fulfilled exactly once, success or failure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::chunk::CacheZone;
use crate::cache::store::CacheStore;
use crate::remote::client::RemoteStore;
use crate::transfer::queue::{CompletionHandle, Priority, TaskQueue, TransferTask};
use crate::transfer::retry::{fetch_with_retry, RetryPolicy};

#[derive(Debug, Default)]
struct TransferCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    bytes_downloaded: AtomicU64,
}

/// Monotone transfer counters, snapshotted for the metrics surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub bytes_downloaded: u64,
}

pub struct WorkerPool {
    queue: TaskQueue,
    cache: Arc<CacheStore>,
    store: Arc<dyn RemoteStore>,
    worker_count: usize,
    shutting_down: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: TransferCounters,
}

impl WorkerPool {
    pub fn new(cache: Arc<CacheStore>, store: Arc<dyn RemoteStore>, worker_count: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: TaskQueue::new(),
            cache,
            store,
            worker_count,
            shutting_down: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            counters: TransferCounters::default(),
        })
    }

    /// Spawn the workers. Calling again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().unwrap();
        if !workers.is_empty() {
            return;
        }
        for id in 0..self.worker_count {
            let pool = Arc::clone(self);
            workers.push(tokio::spawn(async move { pool.worker_loop(id).await }));
        }
        info!(workers = self.worker_count, "worker pool started");
    }

    /// Enqueue a ranged download and return its completion handle. After
    /// shutdown the handle comes back already resolved to failure.
    pub fn submit(&self, key: &str, offset: u64, len: u64, priority: Priority) -> CompletionHandle {
        if self.shutting_down.load(Ordering::Acquire) {
            return CompletionHandle::rejected();
        }

        let (task, handle) = TransferTask::new(key.to_string(), offset, len, priority);
        if let Err(task) = self.queue.push(task) {
            task.finish(false);
        }
        handle
    }

    async fn worker_loop(self: Arc<Self>, id: usize) {
        while let Some(task) = self.queue.pop().await {
            let ok = self.download(&task).await;
            task.finish(ok);
        }
        debug!(worker = id, "worker exiting");
    }

    async fn download(&self, task: &TransferTask) -> bool {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let policy = RetryPolicy::for_priority(task.priority);
        let payload = match fetch_with_retry(
            self.store.as_ref(),
            &task.key,
            task.offset,
            task.len,
            &policy,
        )
        .await
        {
            Ok(payload) => payload,
            Err(err) => {
                if task.priority == Priority::Urgent {
                    error!(key = %task.key, offset = task.offset, error = %err, "urgent download failed");
                } else {
                    debug!(key = %task.key, offset = task.offset, error = %err, "prefetch failed");
                }
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        if payload.is_empty() {
            warn!(key = %task.key, offset = task.offset, "remote returned 0 bytes");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // A short payload means the object ended inside the range; admit the
        // bytes that exist.
        let payload = if payload.len() as u64 > task.len {
            payload.slice(0..task.len as usize)
        } else {
            payload
        };

        let zone = if task.priority == Priority::Urgent {
            CacheZone::Hot
        } else {
            CacheZone::Prefetch
        };

        let len = payload.len() as u64;
        self.cache.insert(&task.key, task.offset, payload, zone);

        self.counters.successful.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_downloaded.fetch_add(len, Ordering::Relaxed);
        true
    }

    /// Stop accepting work, drain the queue, and join all workers. Tasks
    /// already in flight run to completion and fulfill their handles.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("worker pool shutting down");
        self.queue.shutdown();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("all workers stopped");
    }

    pub fn stats(&self) -> TransferStats {
        TransferStats {
            total: self.counters.total.load(Ordering::Relaxed),
            successful: self.counters.successful.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            bytes_downloaded: self.counters.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }
}
