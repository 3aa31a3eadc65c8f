//! Cache store scenarios: eviction order, zone promotion, chunked files.

use bytes::Bytes;
use shardfs::cache::chunk::CacheZone;
use shardfs::cache::store::CacheStore;

fn payload(len: usize, fill: u8) -> Bytes {
    Bytes::from(vec![fill; len])
}

#[test]
fn lru_eviction_drops_the_oldest_hot_file() {
    let cache = CacheStore::new(3 * 1024);

    cache.insert("f1", 0, payload(1024, b'1'), CacheZone::Hot);
    cache.insert("f2", 0, payload(1024, b'2'), CacheZone::Hot);
    cache.insert("f3", 0, payload(1024, b'3'), CacheZone::Hot);

    assert!(cache.contains("f1"));
    assert!(cache.contains("f2"));
    assert!(cache.contains("f3"));

    cache.insert("f4", 0, payload(1024, b'4'), CacheZone::Hot);

    assert!(!cache.contains("f1"));
    assert!(cache.contains("f2"));
    assert!(cache.contains("f3"));
    assert!(cache.contains("f4"));
}

#[test]
fn access_promotes_out_of_prefetch() {
    let cache = CacheStore::new(8 * 1024 * 1024);

    cache.insert("f", 0, payload(1024, b'B'), CacheZone::Prefetch);
    assert_eq!(cache.zone_of("f"), Some(CacheZone::Prefetch));

    cache.access("f", 0);
    assert_eq!(cache.zone_of("f"), Some(CacheZone::Hot));
}

#[test]
fn chunked_file_round_trips_every_chunk() {
    let cache = CacheStore::new(16 * 1024 * 1024);

    cache.insert("large_file.bin", 0, payload(4096, b'A'), CacheZone::Hot);
    cache.insert("large_file.bin", 4096, payload(4096, b'B'), CacheZone::Hot);
    cache.insert("large_file.bin", 8192, payload(4096, b'C'), CacheZone::Hot);

    assert_eq!(cache.get("large_file.bin", 0).unwrap().payload()[0], b'A');
    assert_eq!(cache.get("large_file.bin", 4096).unwrap().payload()[0], b'B');
    assert_eq!(cache.get("large_file.bin", 8192).unwrap().payload()[0], b'C');

    let stats = cache.stats();
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.chunk_count, 3);
    assert_eq!(stats.current_bytes, 3 * 4096);
}

#[test]
fn promoted_file_outlives_speculative_neighbors() {
    let cache = CacheStore::new(2048);

    cache.insert("used.bin", 0, payload(1024, 0), CacheZone::Prefetch);
    cache.insert("unused.bin", 0, payload(1024, 0), CacheZone::Prefetch);
    cache.access("used.bin", 0);

    // The next admission must claim the remaining PREFETCH entry, not the
    // file a reader already touched.
    cache.insert("incoming.bin", 0, payload(1024, 0), CacheZone::Prefetch);

    assert!(cache.contains("used.bin"));
    assert!(!cache.contains("unused.bin"));
    assert!(cache.contains("incoming.bin"));
}

#[test]
fn oversized_chunk_is_admitted_after_emptying_the_cache() {
    let cache = CacheStore::new(1024);
    cache.insert("a.bin", 0, payload(600, 0), CacheZone::Hot);
    cache.insert("b.bin", 0, payload(300, 0), CacheZone::Prefetch);

    cache.insert("huge.bin", 0, payload(10_000, 0), CacheZone::Hot);

    let stats = cache.stats();
    assert!(!cache.contains("a.bin"));
    assert!(!cache.contains("b.bin"));
    assert!(cache.contains("huge.bin"));
    assert_eq!(stats.current_bytes, 10_000);
    assert_eq!(stats.file_count, 1);
}

#[test]
fn occupancy_never_exceeds_budget_under_normal_load() {
    let budget = 8 * 1024;
    let cache = CacheStore::new(budget);

    for i in 0..32 {
        let key = format!("shard_{i:03}.bin");
        let zone = if i % 2 == 0 { CacheZone::Hot } else { CacheZone::Prefetch };
        cache.insert(&key, 0, payload(1024, 0), zone);
        if i % 3 == 0 {
            cache.access(&key, 0);
        }

        let stats = cache.stats();
        assert!(stats.current_bytes <= budget);
        assert_eq!(stats.hot_bytes + stats.prefetch_bytes, stats.current_bytes);
    }
}
