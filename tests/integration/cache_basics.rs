//! End-to-end cache behavior over real files: basic hit/miss accounting,
//! LRU eviction under the entry bound, and the round-trip laws.

mod util;

use std::sync::Arc;

use folio::{default_registry, CacheConfig, DocumentCache};

fn write_file(dir: &tempfile::TempDir, name: &str, bytes: usize) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, "x".repeat(bytes)).expect("write file");
    path.to_string_lossy().into_owned()
}

fn cache_with(max_entries: usize) -> DocumentCache {
    DocumentCache::with_registry(
        CacheConfig {
            max_entries,
            ..CacheConfig::default()
        },
        Arc::new(default_registry()),
    )
}

#[test]
fn basic_hit_after_miss() {
    // Install the crate's subscriber so the cache's hit/miss/eviction
    // events in this binary flow through a real filter.
    folio::logging::init_logging("warn,folio=debug").expect("install subscriber");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(&dir, "f.txt", 5 * 1024);
    let cache = cache_with(100);

    let first = cache.get(&path, None).expect("first load");
    assert!(first.ok);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);

    let second = cache.get(&path, None).expect("cache hit");
    assert!(second.ok);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    // Byte-for-byte identical content, identical fingerprint.
    assert_eq!(first.text(), second.text());
    assert_eq!(first.text().len(), 5 * 1024);
    let checksum_a = first.metadata.expect("metadata").checksum_sha256;
    let checksum_b = second.metadata.expect("metadata").checksum_sha256;
    assert!(checksum_a.is_some());
    assert_eq!(checksum_a, checksum_b);
}

#[test]
fn lru_eviction_respects_recent_touch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = write_file(&dir, "a.txt", 1024);
    let b = write_file(&dir, "b.txt", 1024);
    let c = write_file(&dir, "c.txt", 1024);
    let d = write_file(&dir, "d.txt", 1024);
    let cache = cache_with(3);

    cache.get(&a, None).expect("load a");
    cache.get(&b, None).expect("load b");
    cache.get(&c, None).expect("load c");
    // Touch a: b becomes the least recently used entry.
    cache.get(&a, None).expect("touch a");
    cache.get(&d, None).expect("load d");

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.current_count, 3);

    // a, c, d present as hits; b was evicted and reloads as a miss.
    let hits_before = cache.stats().hits;
    cache.get(&a, None).expect("a hit");
    cache.get(&c, None).expect("c hit");
    cache.get(&d, None).expect("d hit");
    assert_eq!(cache.stats().hits, hits_before + 3);

    let misses_before = cache.stats().misses;
    cache.get(&b, None).expect("b reload");
    assert_eq!(cache.stats().misses, misses_before + 1);
}

#[test]
fn round_trip_laws() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(&dir, "doc.txt", 256);
    let cache = cache_with(10);

    // Load-then-get returns the same content when nothing evicts or
    // changes underneath.
    let loaded = cache.get(&path, None).expect("load");
    let again = cache.get(&path, None).expect("hit");
    assert_eq!(loaded.text(), again.text());

    // Invalidation turns the next access into a miss.
    assert!(cache.invalidate(&path));
    let misses_before = cache.stats().misses;
    cache.get(&path, None).expect("reload");
    assert_eq!(cache.stats().misses, misses_before + 1);

    // Clearing resets occupancy.
    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.current_count, 0);
    assert_eq!(stats.current_bytes, 0);
}

#[test]
fn warming_preloads_sources() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = write_file(&dir, "a.txt", 64);
    let b = write_file(&dir, "b.txt", 64);
    let cache = cache_with(10);

    let report = cache.warm(&[a.as_str(), b.as_str(), "missing://nope"]);
    assert_eq!(report.get(&a), Some(&true));
    assert_eq!(report.get(&b), Some(&true));
    assert_eq!(report.get("missing://nope"), Some(&false));

    let hits_before = cache.stats().hits;
    cache.get(&a, None).expect("warm hit");
    assert_eq!(cache.stats().hits, hits_before + 1);
}

#[test]
fn stats_persistence_round_trips_counters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_file(&dir, "doc.txt", 128);
    let stats_path = dir.path().join("cache_stats.json");

    {
        let cache = DocumentCache::with_registry(
            CacheConfig {
                persist: true,
                persist_path: Some(stats_path.clone()),
                ..CacheConfig::default()
            },
            Arc::new(default_registry()),
        );
        cache.get(&doc, None).expect("load");
        cache.get(&doc, None).expect("hit");
        // Dropping the cache flushes the record.
    }

    let reopened = DocumentCache::with_registry(
        CacheConfig {
            persist: true,
            persist_path: Some(stats_path),
            ..CacheConfig::default()
        },
        Arc::new(default_registry()),
    );
    let stats = reopened.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    // Occupancy never persists.
    assert_eq!(stats.current_count, 0);
}
