//! Document service: async load-or-cache-hit orchestration.
//!
//! The service front-ends the loader registry for UI-facing consumers:
//! non-blocking loads on a bounded worker pool, per-source in-flight
//! deduplication (concurrent requests for one source share a single load
//! and all receive the same result), progress fan-out, previews, and a
//! metadata-only fast path backed by a strict-access-order LRU.
//!
//! Locks are short-lived and never held across I/O: one for the in-flight
//! operation map, one for the metadata cache. Callbacks are always invoked
//! from worker threads with the locks released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cache::nonzero_capacity;
use crate::error::{CoreError, ErrorCode, LoadError};
use crate::exec::{CancelToken, WorkerPool};
use crate::loader::{
    default_registry, load_complete, open_stream, DocumentLoader, LoaderRegistry, StreamOptions,
};
use crate::model::{
    format_size, CompleteCallback, DocumentKind, DocumentMetadata, ErrorCallback, LoadProgress,
    LoadResult, ProgressCallback, SourceId,
};

pub mod global;

/// Preview streams cap their chunk size at 4 KiB for fast first paint.
const PREVIEW_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_workers: usize,
    pub metadata_cache_size: usize,
    pub preview_max_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            metadata_cache_size: 500,
            preview_max_bytes: 1024 * 1024,
        }
    }
}

/// Handle for one `load_async` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Loading,
    Completed,
    Failed,
    Cancelled,
}

/// Snapshot of one tracked operation.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub source: SourceId,
    pub status: OperationStatus,
    pub progress: LoadProgress,
    pub started_at: SystemTime,
    pub metadata: Option<DocumentMetadata>,
    pub error: Option<LoadError>,
}

/// Display-friendly file information.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub formatted_size: String,
    pub kind_label: String,
    pub mime_type: Option<String>,
    pub modified: Option<SystemTime>,
}

/// Metadata-cache counters exposed for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCacheStats {
    pub metadata_entries: usize,
    pub metadata_capacity: usize,
    pub active_operations: usize,
    pub supported_kinds: usize,
}

struct Subscriber {
    id: OperationId,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    cancelled: bool,
}

struct Inflight {
    cancel: CancelToken,
    status: OperationStatus,
    progress: LoadProgress,
    started_at: SystemTime,
    subscribers: Vec<Subscriber>,
}

/// State shared between the service handle and its worker tasks.
struct ServiceShared {
    registry: RwLock<LoaderRegistry>,
    inflight: Mutex<HashMap<SourceId, Inflight>>,
    meta_cache: Mutex<LruCache<SourceId, DocumentMetadata>>,
}

impl ServiceShared {
    fn run_load(self: Arc<Self>, key: SourceId, token: CancelToken) {
        if let Some(entry) = self.inflight.lock().get_mut(&key) {
            entry.status = OperationStatus::Loading;
        }

        let loader = self.registry.read().get_loader(&key);
        let result = match loader {
            None => LoadResult::failure(LoadError::new(
                ErrorCode::NoLoader,
                key.clone(),
                format!("no loader available for: {key}"),
            )),
            Some(loader) => {
                let relay: ProgressCallback = {
                    let shared = Arc::clone(&self);
                    let key = key.clone();
                    Arc::new(move |progress| shared.relay_progress(&key, progress))
                };
                let options = StreamOptions {
                    progress: Some(relay),
                    cancel: Some(token),
                    ..StreamOptions::default()
                };
                load_complete(loader.as_ref(), &key, options)
            }
        };

        if result.ok {
            if let Some(metadata) = &result.metadata {
                self.meta_cache.lock().put(key.clone(), metadata.clone());
            }
        }
        self.finish(&key, result);
    }

    /// Relays one progress snapshot to every attached subscriber.
    fn relay_progress(&self, key: &SourceId, progress: &LoadProgress) {
        let callbacks: Vec<ProgressCallback> = {
            let mut inflight = self.inflight.lock();
            let Some(entry) = inflight.get_mut(key) else {
                return;
            };
            entry.progress = progress.clone();
            entry
                .subscribers
                .iter()
                .filter(|s| !s.cancelled)
                .filter_map(|s| s.on_progress.clone())
                .collect()
        };
        for callback in callbacks {
            callback(progress);
        }
    }

    /// Completes the operation: detaches subscribers and fans the result
    /// out. Cancelled loads deliver only the synthetic error; failed loads
    /// deliver the primary error followed by the (partial) result.
    fn finish(&self, key: &SourceId, result: LoadResult) {
        let subscribers = match self.inflight.lock().remove(key) {
            Some(entry) => entry.subscribers,
            None => Vec::new(),
        };
        let cancelled = result.is_cancelled();
        for subscriber in subscribers.iter().filter(|s| !s.cancelled) {
            if cancelled {
                if let Some(on_error) = &subscriber.on_error {
                    on_error(&LoadError::cancelled(key.clone()));
                }
                continue;
            }
            if !result.ok {
                if let (Some(on_error), Some(err)) =
                    (&subscriber.on_error, result.primary_error())
                {
                    on_error(err);
                }
            }
            if let Some(on_complete) = &subscriber.on_complete {
                on_complete(&result);
            }
        }
    }
}

/// Central coordinator for document loading.
pub struct DocumentService {
    config: ServiceConfig,
    shared: Arc<ServiceShared>,
    pool: WorkerPool,
    next_op: AtomicU64,
    shut_down: AtomicBool,
}

impl DocumentService {
    /// Service over the default loader family.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_registry(config, default_registry())
    }

    pub fn with_registry(config: ServiceConfig, registry: LoaderRegistry) -> Self {
        let capacity = nonzero_capacity(config.metadata_cache_size);
        let pool = WorkerPool::new(config.max_workers, "doc-loader");
        Self {
            config,
            shared: Arc::new(ServiceShared {
                registry: RwLock::new(registry),
                inflight: Mutex::new(HashMap::new()),
                meta_cache: Mutex::new(LruCache::new(capacity)),
            }),
            pool,
            next_op: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Starts (or joins) a background load for `source`.
    ///
    /// If the source is already in flight, the callbacks attach to the
    /// existing operation and no second load runs; every attached caller
    /// receives the same shared result.
    pub fn load_async(
        &self,
        source: &str,
        on_progress: Option<ProgressCallback>,
        on_complete: Option<CompleteCallback>,
        on_error: Option<ErrorCallback>,
    ) -> Result<OperationId, CoreError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CoreError::ShutDown);
        }
        let key = SourceId::canonical(source);
        let id = OperationId(self.next_op.fetch_add(1, Ordering::SeqCst) + 1);
        let subscriber = Subscriber {
            id,
            on_progress,
            on_complete,
            on_error,
            cancelled: false,
        };

        let token = {
            let mut inflight = self.shared.inflight.lock();
            if let Some(entry) = inflight.get_mut(&key) {
                entry.subscribers.push(subscriber);
                debug!(source = %key, %id, "attached to in-flight load");
                return Ok(id);
            }
            let token = CancelToken::new();
            inflight.insert(
                key.clone(),
                Inflight {
                    cancel: token.clone(),
                    status: OperationStatus::Pending,
                    progress: LoadProgress::default(),
                    started_at: SystemTime::now(),
                    subscribers: vec![subscriber],
                },
            );
            token
        };

        let shared = Arc::clone(&self.shared);
        let task_key = key.clone();
        if let Err(err) = self.pool.execute(move || shared.run_load(task_key, token)) {
            self.shared.inflight.lock().remove(&key);
            return Err(err);
        }
        Ok(id)
    }

    /// Blocking convenience load. Not deduplicated against async loads.
    pub fn load_sync(&self, source: &str) -> LoadResult {
        let key = SourceId::canonical(source);
        let Some(loader) = self.shared.registry.read().get_loader(&key) else {
            return LoadResult::failure(LoadError::new(
                ErrorCode::NoLoader,
                key.clone(),
                format!("no loader available for: {key}"),
            ));
        };
        let result = load_complete(loader.as_ref(), &key, StreamOptions::default());
        if result.ok {
            if let Some(metadata) = &result.metadata {
                self.shared.meta_cache.lock().put(key, metadata.clone());
            }
        }
        result
    }

    /// Streams just enough of the document for a preview: at most
    /// `max_lines` lines and `preview_max_bytes` bytes. The stream is
    /// dropped early, releasing the source handle.
    pub fn get_preview(&self, source: &str, max_lines: usize) -> Option<String> {
        let key = SourceId::canonical(source);
        let loader = self.shared.registry.read().get_loader(&key)?;
        let chunk_size = loader.config().chunk_size.min(PREVIEW_CHUNK_SIZE).max(1);
        let options = StreamOptions {
            chunk_size: Some(chunk_size),
            ..StreamOptions::default()
        };
        let mut stream = match open_stream(loader.as_ref(), &key, options) {
            Ok(stream) => stream,
            Err(err) => {
                debug!(source = %key, %err, "preview unavailable");
                return None;
            }
        };

        let mut preview = String::new();
        let mut lines = 0usize;
        for item in &mut stream {
            match item {
                Ok(text) => {
                    lines += text.matches('\n').count();
                    preview.push_str(&text);
                    if lines >= max_lines || preview.len() > self.config.preview_max_bytes {
                        break;
                    }
                }
                Err(err) => {
                    warn!(source = %key, %err, "preview stream failed");
                    break;
                }
            }
        }
        (!preview.is_empty()).then_some(preview)
    }

    /// Metadata fast path: LRU-cached unless `force_refresh`.
    pub fn get_metadata(&self, source: &str, force_refresh: bool) -> Option<DocumentMetadata> {
        let key = SourceId::canonical(source);
        if !force_refresh {
            if let Some(metadata) = self.shared.meta_cache.lock().get(&key) {
                return Some(metadata.clone());
            }
        }
        let loader = self.shared.registry.read().get_loader(&key)?;
        match loader.extract_metadata(&key) {
            Ok(metadata) => {
                self.shared.meta_cache.lock().put(key, metadata.clone());
                Some(metadata)
            }
            Err(err) => {
                debug!(source = %key, %err, "metadata extraction failed");
                None
            }
        }
    }

    /// Display-friendly file info for existing file sources.
    pub fn get_file_info(&self, source: &str) -> Option<FileInfo> {
        let key = SourceId::canonical(source);
        if !key.is_file() {
            return None;
        }
        let metadata = self.get_metadata(source, false)?;
        Some(FileInfo {
            name: key.name().to_string(),
            path: key.as_str().to_string(),
            size_bytes: metadata.size_bytes,
            formatted_size: format_size(metadata.size_bytes),
            kind_label: metadata.kind.label().to_string(),
            mime_type: metadata.mime_type.clone(),
            modified: metadata.modified,
        })
    }

    /// Cancels one subscriber. When the last subscriber of a load cancels,
    /// the underlying stream's cancel token trips. The subscriber's error
    /// callback (if any) receives the synthetic `CANCELLED` error.
    pub fn cancel(&self, id: OperationId) -> bool {
        let mut notify: Option<(ErrorCallback, SourceId)> = None;
        let found = {
            let mut inflight = self.shared.inflight.lock();
            let mut found = false;
            for (key, entry) in inflight.iter_mut() {
                if let Some(subscriber) = entry
                    .subscribers
                    .iter_mut()
                    .find(|s| s.id == id && !s.cancelled)
                {
                    subscriber.cancelled = true;
                    if let Some(on_error) = subscriber.on_error.clone() {
                        notify = Some((on_error, key.clone()));
                    }
                    if entry.subscribers.iter().all(|s| s.cancelled) {
                        entry.cancel.cancel();
                        entry.status = OperationStatus::Cancelled;
                    }
                    found = true;
                    break;
                }
            }
            found
        };
        if let Some((on_error, key)) = notify {
            on_error(&LoadError::cancelled(key));
        }
        found
    }

    /// Cancels every active operation. Returns the number of subscribers
    /// cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut notifications: Vec<(ErrorCallback, SourceId)> = Vec::new();
        let count = {
            let mut inflight = self.shared.inflight.lock();
            let mut count = 0;
            for (key, entry) in inflight.iter_mut() {
                entry.cancel.cancel();
                entry.status = OperationStatus::Cancelled;
                for subscriber in entry.subscribers.iter_mut().filter(|s| !s.cancelled) {
                    subscriber.cancelled = true;
                    count += 1;
                    if let Some(on_error) = subscriber.on_error.clone() {
                        notifications.push((on_error, key.clone()));
                    }
                }
            }
            count
        };
        for (on_error, key) in notifications {
            on_error(&LoadError::cancelled(key));
        }
        count
    }

    /// Snapshots of all in-flight operations (one per live subscriber).
    pub fn active_operations(&self) -> Vec<Operation> {
        let inflight = self.shared.inflight.lock();
        inflight
            .iter()
            .flat_map(|(key, entry)| {
                entry
                    .subscribers
                    .iter()
                    .filter(|s| !s.cancelled)
                    .map(|s| Operation {
                        id: s.id,
                        source: key.clone(),
                        status: entry.status,
                        progress: entry.progress.clone(),
                        started_at: entry.started_at,
                        metadata: None,
                        error: None,
                    })
            })
            .collect()
    }

    pub fn is_loading(&self, source: &str) -> bool {
        let key = SourceId::canonical(source);
        self.shared.inflight.lock().contains_key(&key)
    }

    pub fn register_loader(&self, loader: Arc<dyn DocumentLoader>) {
        self.shared.registry.write().register(loader);
    }

    pub fn supported_kinds(&self) -> Vec<DocumentKind> {
        self.shared.registry.read().supported_kinds()
    }

    pub fn can_handle(&self, source: &str) -> bool {
        let key = SourceId::canonical(source);
        self.shared.registry.read().get_loader(&key).is_some()
    }

    pub fn clear_cache(&self) {
        self.shared.meta_cache.lock().clear();
    }

    pub fn cache_stats(&self) -> ServiceCacheStats {
        ServiceCacheStats {
            metadata_entries: self.shared.meta_cache.lock().len(),
            metadata_capacity: self.config.metadata_cache_size,
            active_operations: self.shared.inflight.lock().len(),
            supported_kinds: self.supported_kinds().len(),
        }
    }

    /// Cancels everything and drains the worker pool. Idempotent; further
    /// `load_async` calls fail with [`CoreError::ShutDown`].
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_all();
        self.pool.shutdown();
        self.clear_cache();
    }
}

impl Drop for DocumentService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
