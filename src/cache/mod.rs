//! Document cache: a thread-safe LRU over completed load results.
//!
//! Entries are keyed by canonical [`SourceId`] and bounded both by total
//! byte size and entry count. Eviction pops the least-recently-used entry
//! until both bounds hold. File-backed entries are checked for staleness
//! against the source's modification time on every hit; a stale entry is
//! never returned.
//!
//! One lock guards the map, the access-order structure, the running byte
//! total and the statistics. Loads triggered by a miss run *outside* the
//! lock so readers are never blocked on I/O; the lock is reacquired only
//! for the final `put`.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::loader::{load_complete, DocumentLoader, LoaderRegistry, StreamOptions};
use crate::model::{DocumentMetadata, LoadResult, SourceId};

mod stats;

pub use self::stats::CacheStats;

/// Default cache budget: 100 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
/// Default entry bound.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_bytes: u64,
    pub max_entries: usize,
    pub stats_enabled: bool,
    pub warming_enabled: bool,
    pub persist: bool,
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            stats_enabled: true,
            warming_enabled: true,
            persist: false,
            persist_path: None,
        }
    }
}

/// One cached load. Owned exclusively by the cache; consumers only ever
/// see [`LoadResult`] snapshots sharing the chunk storage.
struct CacheEntry {
    chunks: Arc<Vec<String>>,
    metadata: DocumentMetadata,
    size_bytes: u64,
    access_count: u64,
    last_accessed: SystemTime,
    source_modified_at: Option<SystemTime>,
}

impl CacheEntry {
    /// Stale when the backing file disappeared or was modified after
    /// caching. Entries without a captured mtime (non-file sources) never
    /// go stale.
    fn is_stale(&self, source: &SourceId) -> bool {
        let Some(cached_mtime) = self.source_modified_at else {
            return false;
        };
        match std::fs::metadata(source.to_path()).and_then(|m| m.modified()) {
            Ok(current) => current > cached_mtime,
            Err(_) => true, // disappeared or unreadable
        }
    }

    fn snapshot(&self) -> LoadResult {
        LoadResult {
            ok: true,
            chunks: Arc::clone(&self.chunks),
            metadata: Some(self.metadata.clone()),
            errors: Vec::new(),
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

struct CacheInner {
    map: LruCache<SourceId, CacheEntry>,
    current_bytes: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn remove(&mut self, key: &SourceId) -> Option<CacheEntry> {
        let entry = self.map.pop(key)?;
        self.current_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Pops LRU entries until `extra` more bytes fit and the entry bound
    /// leaves room for one insert.
    fn evict_for(&mut self, extra: u64, config: &CacheConfig) {
        while self.current_bytes + extra > config.max_bytes
            || self.map.len() >= config.max_entries
        {
            let Some((key, entry)) = self.map.pop_lru() else {
                break;
            };
            self.current_bytes -= entry.size_bytes;
            if config.stats_enabled {
                self.stats.evictions += 1;
                self.stats.total_saved_bytes += entry.size_bytes;
            }
            debug!(source = %key, size = entry.size_bytes, "evicted cache entry");
        }
    }
}

/// Thread-safe LRU cache for completed document loads.
///
/// With a registry attached, `get` transparently loads missed sources and
/// caches the successful result.
pub struct DocumentCache {
    config: CacheConfig,
    registry: Option<Arc<LoaderRegistry>>,
    inner: Mutex<CacheInner>,
}

impl DocumentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_registry(config: CacheConfig, registry: Arc<LoaderRegistry>) -> Self {
        Self::build(config, Some(registry))
    }

    fn build(config: CacheConfig, registry: Option<Arc<LoaderRegistry>>) -> Self {
        let stats = if config.persist {
            config
                .persist_path
                .as_deref()
                .and_then(stats::load_stats)
                .unwrap_or_default()
        } else {
            CacheStats::default()
        };
        Self {
            config,
            registry,
            inner: Mutex::new(CacheInner {
                map: LruCache::unbounded(),
                current_bytes: 0,
                stats,
            }),
        }
    }

    /// Cache lookup, loading on miss when a loader (or registry) is
    /// available.
    ///
    /// A fresh hit touches the entry and returns a zero-elapsed snapshot.
    /// A stale hit is dropped and treated as a miss. Failed loads are
    /// returned to the caller but never cached.
    pub fn get(&self, source: &str, loader: Option<&dyn DocumentLoader>) -> Option<LoadResult> {
        let key = SourceId::canonical(source);
        {
            let mut inner = self.inner.lock();
            inner.stats.total_accesses += 1;

            let stale = inner
                .map
                .peek(&key)
                .map(|entry| entry.is_stale(&key))
                .unwrap_or(false);
            if stale {
                inner.remove(&key);
                debug!(source = %key, "dropped stale cache entry");
            } else if let Some(entry) = inner.map.get_mut(&key) {
                entry.access_count += 1;
                entry.last_accessed = SystemTime::now();
                let snapshot = entry.snapshot();
                let size = entry.size_bytes;
                if self.config.stats_enabled {
                    inner.stats.hits += 1;
                    inner.stats.total_loaded_bytes += size;
                }
                return Some(snapshot);
            }
            if self.config.stats_enabled {
                inner.stats.misses += 1;
            }
        }

        // Miss path: load outside the lock.
        let result = self.load_for(&key, loader)?;
        if result.ok {
            self.put(source, &result);
        }
        Some(result)
    }

    fn load_for(
        &self,
        key: &SourceId,
        loader: Option<&dyn DocumentLoader>,
    ) -> Option<LoadResult> {
        if let Some(loader) = loader {
            return Some(load_complete(loader, key, StreamOptions::default()));
        }
        let registry = self.registry.as_ref()?;
        let loader = registry.get_loader(key)?;
        Some(load_complete(loader.as_ref(), key, StreamOptions::default()))
    }

    /// Inserts a successful result. Returns `false` (never panics, never
    /// throws) when the result is not cacheable: failed loads, missing
    /// metadata, or a single entry larger than the whole byte budget.
    pub fn put(&self, source: &str, result: &LoadResult) -> bool {
        if !result.ok {
            return false;
        }
        let Some(metadata) = result.metadata.clone() else {
            warn!(source, "refusing to cache result without metadata");
            return false;
        };
        let key = SourceId::canonical(source);
        let size_bytes = result.content_bytes() + metadata.footprint();

        // Best-effort mtime capture; must not block the put on slow I/O
        // beyond a single stat.
        let source_modified_at = std::fs::metadata(key.to_path())
            .and_then(|m| m.modified())
            .ok();

        let mut inner = self.inner.lock();
        if size_bytes > self.config.max_bytes {
            warn!(
                source = %key,
                size_bytes,
                max_bytes = self.config.max_bytes,
                code = %ErrorCode::CacheOversize,
                "entry exceeds cache budget; rejected"
            );
            return false;
        }
        inner.remove(&key);
        inner.evict_for(size_bytes, &self.config);
        inner.map.put(
            key,
            CacheEntry {
                chunks: Arc::clone(&result.chunks),
                metadata,
                size_bytes,
                access_count: 1,
                last_accessed: SystemTime::now(),
                source_modified_at,
            },
        );
        inner.current_bytes += size_bytes;
        true
    }

    /// Removes one entry. Returns whether it was present.
    pub fn invalidate(&self, source: &str) -> bool {
        let key = SourceId::canonical(source);
        self.inner.lock().remove(&key).is_some()
    }

    /// Removes every entry whose source matches the glob pattern. Returns
    /// the number removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize, crate::error::CoreError> {
        let glob = globset::Glob::new(pattern)
            .map_err(|e| crate::error::CoreError::InvalidArgument(e.to_string()))?
            .compile_matcher();
        let mut inner = self.inner.lock();
        let matching: Vec<SourceId> = inner
            .map
            .iter()
            .filter(|(key, _)| glob.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        let count = matching.len();
        for key in matching {
            inner.remove(&key);
        }
        Ok(count)
    }

    /// Drops all entries whose backing source changed or disappeared.
    pub fn invalidate_stale(&self) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<SourceId> = inner
            .map
            .iter()
            .filter(|(key, entry)| entry.is_stale(key))
            .map(|(key, _)| key.clone())
            .collect();
        let count = stale.len();
        for key in stale {
            inner.remove(&key);
        }
        count
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.current_bytes = 0;
    }

    /// Pre-loads `sources`, reporting per-source success. A disabled
    /// warming config reports everything as skipped.
    pub fn warm(&self, sources: &[&str]) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for &source in sources {
            let loaded = if self.config.warming_enabled {
                self.get(source, None).map(|r| r.ok).unwrap_or(false)
            } else {
                false
            };
            results.insert(source.to_string(), loaded);
        }
        results
    }

    /// Counter snapshot with occupancy filled in.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.current_bytes = inner.current_bytes;
        stats.current_count = inner.map.len() as u64;
        stats
    }

    /// Most frequently accessed entries, up to `limit`.
    pub fn access_frequency(&self, limit: usize) -> Vec<(String, u64)> {
        let inner = self.inner.lock();
        let mut frequencies: Vec<(String, u64)> = inner
            .map
            .iter()
            .map(|(key, entry)| (key.as_str().to_string(), entry.access_count))
            .collect();
        frequencies.sort_by(|a, b| b.1.cmp(&a.1));
        frequencies.truncate(limit);
        frequencies
    }

    /// Current cache keys, most recently used first.
    pub fn keys(&self) -> Vec<SourceId> {
        self.inner.lock().map.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Writes the stats record if persistence is configured.
    pub fn flush_stats(&self) {
        if !self.config.persist {
            return;
        }
        let Some(path) = self.config.persist_path.as_deref() else {
            warn!("stats persistence enabled without a path");
            return;
        };
        stats::save_stats(path, &self.stats());
    }

    #[cfg(test)]
    fn current_bytes(&self) -> u64 {
        self.inner.lock().current_bytes
    }
}

impl Drop for DocumentCache {
    fn drop(&mut self) {
        self.flush_stats();
    }
}

/// Capacity helper used where the `lru` crate needs a nonzero bound.
pub(crate) fn nonzero_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN)
}
