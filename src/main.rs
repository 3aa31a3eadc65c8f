//! shardfs service entry point.
//!
//! Wires the core together: remote store client, chunk cache, worker pool,
//! predictor, read façade, and the metrics endpoint. The kernel filesystem
//! binding links against [`shardfs::fs::ShardFs`] and drives it from its
//! operation callbacks; teardown runs in reverse dependency order
//! (predictor → workers → cache).

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use shardfs::cache::store::CacheStore;
use shardfs::config::{Cli, Config};
use shardfs::fs::ShardFs;
use shardfs::predictor::Predictor;
use shardfs::remote::client::RemoteStore;
use shardfs::remote::s3::S3Store;
use shardfs::server::metrics::{build_router, AppState};
use shardfs::transfer::pool::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("shardfs: {err}");
            eprintln!("Run with --help for usage.");
            std::process::exit(2);
        }
    };

    init_tracing(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "shardfs starting");
    info!(
        mount = %config.mount.display(),
        bucket = %config.bucket,
        region = %config.region,
        prefix = ?config.prefix,
        cache_size = config.cache_size,
        chunk_size = config.chunk_size,
        workers = config.workers,
        lookahead = config.lookahead,
        "configuration loaded"
    );

    let store: Arc<dyn RemoteStore> = Arc::new(
        S3Store::connect(
            config.bucket.clone(),
            config.region.clone(),
            config.prefix.clone(),
        )
        .await,
    );

    let cache = Arc::new(CacheStore::new(config.cache_size));
    let pool = WorkerPool::new(Arc::clone(&cache), Arc::clone(&store), config.workers);
    pool.start();

    let predictor = Predictor::new(
        Arc::clone(&cache),
        Arc::clone(&pool),
        config.lookahead,
        config.chunk_size,
    );
    if let Some(path) = &config.manifest {
        match predictor.load_manifest(path) {
            Ok(entries) => info!(path = %path.display(), entries, "manifest active"),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "manifest unavailable, falling back to sequential heuristic"
            ),
        }
    }
    predictor.start();

    let fs = Arc::new(ShardFs::new(
        Arc::clone(&cache),
        Arc::clone(&pool),
        Arc::clone(&predictor),
        config.chunk_size,
    ));

    // Seed file metadata so the root listing is populated before first open.
    match store.list(1000).await {
        Ok(listing) => {
            if listing.truncated {
                warn!(max_keys = 1000, "object listing truncated; directory view is partial");
            }
            for obj in &listing.objects {
                fs.register(&obj.key, obj.size);
            }
            info!(objects = listing.objects.len(), "metadata seeded from listing");
        }
        Err(err) => warn!(error = %err, "initial listing failed; sizes discovered on demand"),
    }

    let state = Arc::new(AppState {
        cache: Arc::clone(&cache),
        pool: Arc::clone(&pool),
        predictor: Arc::clone(&predictor),
        start_time: Instant::now(),
    });
    let listener = TcpListener::bind(("0.0.0.0", config.metrics_port)).await?;
    info!(port = config.metrics_port, "metrics endpoint listening");
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, build_router(state)).await {
            error!(error = %err, "metrics server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    predictor.stop().await;
    pool.shutdown().await;
    server.abort();

    info!("shardfs stopped");
    Ok(())
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let default_filter = if config.enable_tracing {
        "shardfs=debug"
    } else {
        "shardfs=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    if config.enable_tracing {
        let file = std::fs::File::create(&config.trace_output)?;
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Arc::new(file)),
            )
            .init();
    } else {
        registry.init();
    }

    Ok(())
}
