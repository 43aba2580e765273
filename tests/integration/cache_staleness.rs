//! Staleness detection: a modified or deleted source must never be served
//! from cache.

mod util;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use folio::{default_registry, CacheConfig, DocumentCache};

fn advance_mtime(path: &std::path::Path) {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("open for mtime");
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .expect("set mtime");
}

fn cache() -> DocumentCache {
    DocumentCache::with_registry(CacheConfig::default(), Arc::new(default_registry()))
}

#[test]
fn modified_file_reloads_new_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("f.txt");
    std::fs::write(&path, "v1").expect("write v1");
    let source = path.to_string_lossy().into_owned();
    let cache = cache();

    let first = cache.get(&source, None).expect("load v1");
    assert_eq!(first.text(), "v1");
    assert_eq!(cache.stats().misses, 1);

    std::fs::write(&path, "v2").expect("write v2");
    advance_mtime(&path);

    // Stale entry drops; the reload sees the new content.
    let second = cache.get(&source, None).expect("reload v2");
    assert_eq!(second.text(), "v2");
    assert_eq!(cache.stats().misses, 2);

    // The cache now holds v2: next access is a hit with the new bytes.
    let third = cache.get(&source, None).expect("hit v2");
    assert_eq!(third.text(), "v2");
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn deleted_file_is_stale() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gone.txt");
    std::fs::write(&path, "content").expect("write");
    let source = path.to_string_lossy().into_owned();
    let cache = cache();

    cache.get(&source, None).expect("load");
    std::fs::remove_file(&path).expect("delete");

    // Entry is stale and the source can no longer load.
    let result = cache.get(&source, None);
    assert!(result.is_none() || !result.expect("result").ok);
    assert_eq!(cache.stats().hits, 0);
}

#[test]
fn invalidate_stale_sweeps_modified_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fresh = dir.path().join("fresh.txt");
    let touched = dir.path().join("touched.txt");
    std::fs::write(&fresh, "fresh").expect("write");
    std::fs::write(&touched, "old").expect("write");
    let cache = cache();

    cache
        .get(&fresh.to_string_lossy(), None)
        .expect("load fresh");
    cache
        .get(&touched.to_string_lossy(), None)
        .expect("load touched");

    advance_mtime(&touched);
    assert_eq!(cache.invalidate_stale(), 1);
    assert_eq!(cache.stats().current_count, 1);
}

#[test]
fn pattern_invalidation_matches_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_a = dir.path().join("one.log");
    let log_b = dir.path().join("two.log");
    let txt = dir.path().join("keep.txt");
    for (path, body) in [(&log_a, "a"), (&log_b, "b"), (&txt, "c")] {
        std::fs::write(path, body).expect("write");
    }
    let cache = cache();
    for path in [&log_a, &log_b, &txt] {
        cache.get(&path.to_string_lossy(), None).expect("load");
    }

    let removed = cache.invalidate_pattern("**/*.log").expect("glob");
    assert_eq!(removed, 2);
    assert_eq!(cache.stats().current_count, 1);
}
