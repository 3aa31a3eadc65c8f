//! Access predictor.
//!
//! A single background actor watches the most recent file open and schedules
//! speculative downloads for the shards likely to follow it. Order comes
//! from a user-supplied manifest when one is loaded, otherwise from the
//! sequential-naming heuristic (`shard_042.bin` → `shard_043.bin`).
//!
//! Prediction failures only cost hit rate; they never affect cache
//! correctness, so every error on this path is absorbed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::store::CacheStore;
use crate::config::PREDICTOR_INTERVAL;
use crate::transfer::pool::WorkerPool;
use crate::transfer::queue::{CompletionHandle, Priority};

/// Filename grammar for sequential shards: prefix, digit run, dot suffix.
/// The prefix is non-greedy so `shard_042.bin` captures `042`, not `2`.
static SEQUENTIAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d+)(\..*)$").expect("sequential name pattern"));

/// Derive the next filename in a numeric sequence, preserving zero padding
/// (`042` → `043`) and widening naturally on rollover (`999` → `1000`).
pub fn predict_next_sequential(name: &str) -> Option<String> {
    let caps = SEQUENTIAL_NAME.captures(name)?;
    let prefix = &caps[1];
    let digits = &caps[2];
    let suffix = &caps[3];

    let number: u64 = digits.parse().ok()?;
    let next = number.checked_add(1)?;

    Some(format!("{prefix}{next:0width$}{suffix}", width = digits.len()))
}

#[derive(Debug, Default)]
struct PredictorCounters {
    predictions_made: AtomicU64,
    prefetches_issued: AtomicU64,
    pattern_hits: AtomicU64,
    manifest_hits: AtomicU64,
}

/// Monotone predictor counters, snapshotted for the metrics surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PredictorStats {
    pub predictions_made: u64,
    pub prefetches_issued: u64,
    pub pattern_hits: u64,
    pub manifest_hits: u64,
}

#[derive(Default)]
struct ManifestState {
    entries: Vec<String>,
    active: bool,
}

#[derive(Default)]
struct InFlight {
    keys: HashSet<String>,
    handles: Vec<(String, CompletionHandle)>,
}

pub struct Predictor {
    cache: Arc<CacheStore>,
    pool: Arc<WorkerPool>,
    lookahead: usize,
    chunk_size: u64,
    interval: Duration,
    manifest: Mutex<ManifestState>,
    last_accessed: Mutex<Option<String>>,
    in_flight: Mutex<InFlight>,
    stop_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: PredictorCounters,
}

impl Predictor {
    pub fn new(
        cache: Arc<CacheStore>,
        pool: Arc<WorkerPool>,
        lookahead: usize,
        chunk_size: u64,
    ) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            cache,
            pool,
            lookahead,
            chunk_size,
            interval: PREDICTOR_INTERVAL,
            manifest: Mutex::new(ManifestState::default()),
            last_accessed: Mutex::new(None),
            in_flight: Mutex::new(InFlight::default()),
            stop_tx,
            worker: Mutex::new(None),
            counters: PredictorCounters::default(),
        })
    }

    /// Record a file open. Non-blocking; latest writer wins.
    pub fn on_file_accessed(&self, key: &str) {
        *self.last_accessed.lock().unwrap() = Some(key.to_string());
    }

    /// Load an ordered key manifest: one key per line, trimmed, `#` comments
    /// and blank lines ignored. Replaces any prior manifest. Returns the
    /// number of entries.
    pub fn load_manifest(&self, path: &Path) -> std::io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();

        let count = entries.len();
        let mut manifest = self.manifest.lock().unwrap();
        manifest.active = !entries.is_empty();
        manifest.entries = entries;

        info!(entries = count, "manifest loaded");
        Ok(count)
    }

    /// Spawn the prediction loop. Calling again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.worker.lock().unwrap();
        if slot.is_some() {
            return;
        }

        let predictor = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(predictor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        predictor.reap_completed();
                        let current = predictor.last_accessed.lock().unwrap().clone();
                        if let Some(key) = current {
                            predictor.predict_and_prefetch(&key);
                        }
                    }
                }
            }
            debug!("predictor loop exited");
        }));

        info!(lookahead = self.lookahead, "predictor started");
    }

    /// Stop the loop and join it. In-flight prefetches are not cancelled;
    /// their handles are discarded and any late admissions are benign.
    /// Idempotent.
    pub async fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        let Some(handle) = handle else { return };

        let _ = self.stop_tx.send(true);
        let _ = handle.await;

        let mut in_flight = self.in_flight.lock().unwrap();
        in_flight.handles.clear();
        in_flight.keys.clear();
        info!("predictor stopped");
    }

    /// Drop handles whose downloads have resolved so the in-flight set stays
    /// bounded and resolved keys become prefetchable again.
    fn reap_completed(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let resolved: Vec<String> = in_flight
            .handles
            .iter()
            .filter(|(_, handle)| handle.try_ready().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        if resolved.is_empty() {
            return;
        }

        in_flight.handles.retain(|(_, handle)| handle.try_ready().is_none());
        for key in &resolved {
            in_flight.keys.remove(key);
        }
    }

    /// Predict up to `lookahead` successors of `key` and submit a NORMAL
    /// first-chunk download for each one not already cached or in flight.
    pub fn predict_and_prefetch(&self, key: &str) {
        self.counters.predictions_made.fetch_add(1, Ordering::Relaxed);

        let manifest_candidates = {
            let manifest = self.manifest.lock().unwrap();
            if manifest.active {
                let candidates = manifest
                    .entries
                    .iter()
                    .position(|entry| entry == key)
                    .map(|pos| {
                        manifest.entries[pos + 1..]
                            .iter()
                            .take(self.lookahead)
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Some(candidates)
            } else {
                None
            }
        };

        let candidates = match manifest_candidates {
            Some(candidates) => {
                if !candidates.is_empty() {
                    self.counters.manifest_hits.fetch_add(1, Ordering::Relaxed);
                }
                candidates
            }
            None => {
                let mut candidates = Vec::new();
                let mut current = key.to_string();
                for _ in 0..self.lookahead {
                    match predict_next_sequential(&current) {
                        Some(next) => {
                            candidates.push(next.clone());
                            current = next;
                        }
                        None => break,
                    }
                }
                if !candidates.is_empty() {
                    self.counters.pattern_hits.fetch_add(1, Ordering::Relaxed);
                }
                candidates
            }
        };

        for candidate in candidates {
            if self.cache.contains(&candidate) {
                continue;
            }
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                if !in_flight.keys.insert(candidate.clone()) {
                    continue;
                }
            }

            let handle = self.pool.submit(&candidate, 0, self.chunk_size, Priority::Normal);
            debug!(key = %candidate, "prefetch issued");
            self.in_flight
                .lock()
                .unwrap()
                .handles
                .push((candidate, handle));
            self.counters.prefetches_issued.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> PredictorStats {
        PredictorStats {
            predictions_made: self.counters.predictions_made.load(Ordering::Relaxed),
            prefetches_issued: self.counters.prefetches_issued.load(Ordering::Relaxed),
            pattern_hits: self.counters.pattern_hits.load(Ordering::Relaxed),
            manifest_hits: self.counters.manifest_hits.load(Ordering::Relaxed),
        }
    }
}
