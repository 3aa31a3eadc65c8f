//! Metrics endpoint.
//!
//! - GET /metrics: Prometheus text format
//! - GET /stats:   JSON snapshot of all counters
//! - GET /health:  liveness probe

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::cache::store::{CacheStats, CacheStore};
use crate::predictor::{Predictor, PredictorStats};
use crate::transfer::pool::{TransferStats, WorkerPool};

/// State shared across handlers.
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub pool: Arc<WorkerPool>,
    pub predictor: Arc<Predictor>,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct StatsResponse {
    uptime_secs: u64,
    cache: CacheStats,
    transfers: TransferStats,
    predictor: PredictorStats,
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache: state.cache.stats(),
        transfers: state.pool.stats(),
        predictor: state.predictor.stats(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    let cache = state.cache.stats();
    let transfers = state.pool.stats();
    let predictor = state.predictor.stats();

    let mut out = String::new();
    gauge(&mut out, "shardfs_cache_size_bytes", "Current cache occupancy in bytes", cache.current_bytes);
    gauge(&mut out, "shardfs_cache_max_bytes", "Configured cache byte budget", cache.max_bytes);
    gauge(&mut out, "shardfs_cache_hot_bytes", "Bytes held by HOT zone entries", cache.hot_bytes);
    gauge(&mut out, "shardfs_cache_prefetch_bytes", "Bytes held by PREFETCH zone entries", cache.prefetch_bytes);
    gauge(&mut out, "shardfs_cache_files", "Cached file entries", cache.file_count as u64);
    gauge(&mut out, "shardfs_cache_chunks", "Cached chunks", cache.chunk_count as u64);

    counter(&mut out, "shardfs_downloads_total", "Download tasks executed", transfers.total);
    counter(&mut out, "shardfs_downloads_successful_total", "Download tasks that succeeded", transfers.successful);
    counter(&mut out, "shardfs_downloads_failed_total", "Download tasks that failed", transfers.failed);
    counter(&mut out, "shardfs_downloaded_bytes_total", "Bytes fetched from the remote store", transfers.bytes_downloaded);

    counter(&mut out, "shardfs_predictions_total", "Prediction rounds run", predictor.predictions_made);
    counter(&mut out, "shardfs_prefetches_issued_total", "Speculative downloads submitted", predictor.prefetches_issued);
    counter(&mut out, "shardfs_pattern_hits_total", "Prediction rounds with sequential-name candidates", predictor.pattern_hits);
    counter(&mut out, "shardfs_manifest_hits_total", "Prediction rounds with manifest candidates", predictor.manifest_hits);

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}\n");
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}\n");
}
