//! Streaming loader framework.
//!
//! A loader is a stateless *policy* describing how to open, read, decode
//! and describe one family of sources. All per-load state (file handle,
//! decoder carry, row buffer) lives in the [`SourceStream`] value returned
//! by [`DocumentLoader::open`], so a single loader instance can serve many
//! concurrent loads.
//!
//! [`open_stream`] wires a loader and a source into a [`LoadStream`]: a
//! finite, non-restartable iterator of decoded text chunks that feeds every
//! raw chunk to a SHA-256 accumulator before decoding, throttles progress
//! callbacks to the configured interval, and releases the source handle on
//! every exit path (including early drop). [`load_complete`] materializes
//! a stream into a [`LoadResult`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::{ErrorCode, LoadError, Result};
use crate::exec::CancelToken;
use crate::model::{
    DocumentKind, DocumentMetadata, LoadProgress, LoadResult, ProgressCallback, SourceId,
};

pub mod csv;
pub mod decode;
pub mod markdown;
pub mod pdf;
pub mod registry;
pub mod text;

pub use self::registry::{default_registry, LoaderRegistry};

/// Default chunk size for byte-oriented loaders.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
/// Minimum spacing between successive progress callback invocations.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Per-loader tuning knobs. `chunk_size` is in the loader's natural unit:
/// bytes for text-family loaders, rows for CSV.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub chunk_size: usize,
    pub progress_interval: Duration,
    pub max_retries: u32,
    pub hashing_enabled: bool,
    pub progress_enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_retries: 3,
            hashing_enabled: true,
            progress_enabled: true,
        }
    }
}

/// Per-stream options. Everything unset falls back to the loader's
/// [`LoaderConfig`]. Options are plain per-call values, which is what makes
/// chunk-size overrides (previews) safe without any loader state to
/// restore afterwards.
#[derive(Clone, Default)]
pub struct StreamOptions {
    pub progress: Option<ProgressCallback>,
    pub progress_interval: Option<Duration>,
    pub chunk_size: Option<usize>,
    pub hashing: Option<bool>,
    pub cancel: Option<CancelToken>,
}

/// Collects warnings during a stream. `push_once` deduplicates by code so
/// e.g. an encoding fallback is reported once per stream, not per chunk.
#[derive(Debug, Default)]
pub struct WarningSink {
    warnings: Vec<LoadError>,
    seen: BTreeSet<ErrorCode>,
}

impl WarningSink {
    pub fn push(&mut self, warning: LoadError) {
        self.warnings.push(warning);
    }

    pub fn push_once(&mut self, warning: LoadError) {
        if self.seen.insert(warning.code) {
            self.warnings.push(warning);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_vec(self) -> Vec<LoadError> {
        self.warnings
    }
}

/// Stateless loader policy for one document family.
pub trait DocumentLoader: Send + Sync {
    /// Document kinds this loader produces.
    fn kinds(&self) -> &'static [DocumentKind];

    /// Whether this loader can handle the given source.
    fn supports(&self, source: &SourceId) -> bool;

    /// Opens the source and returns the per-load stream state.
    /// `chunk_size` is the effective chunk size in the loader's natural
    /// unit.
    fn open(&self, source: &SourceId, chunk_size: usize) -> Result<Box<dyn SourceStream>>;

    /// Extracts metadata without materializing content.
    fn extract_metadata(&self, source: &SourceId) -> Result<DocumentMetadata>;

    fn config(&self) -> &LoaderConfig;
}

/// Per-load stream state: owns the source handle and any decode carry.
pub trait SourceStream: Send {
    /// Next raw chunk in read order, or `None` at end of stream. The raw
    /// bytes returned here, concatenated, are exactly the bytes read from
    /// the source (this is what the content hash covers).
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Decodes/renders one raw chunk to text. May buffer bytes across
    /// calls (e.g. a multi-byte sequence split at a chunk boundary).
    fn process_chunk(&mut self, raw: &[u8], warnings: &mut WarningSink) -> Result<String>;

    /// Flushes any carried state at end of stream. The returned text (if
    /// any) is yielded as a final chunk; it corresponds to bytes already
    /// hashed.
    fn finish(&mut self, _warnings: &mut WarningSink) -> Result<Option<String>> {
        Ok(None)
    }

    /// Total size of the source in bytes, when known.
    fn total_bytes(&self) -> Option<u64> {
        None
    }

    /// Total number of chunks the stream will yield, when known.
    fn total_chunks(&self) -> Option<u64> {
        None
    }
}

/// Driving iterator over a single load.
///
/// Yields decoded text chunks; terminates either at end of stream (hash
/// finalized into the metadata, final progress callback fired) or at the
/// first error (handle released, checksum left unset).
pub struct LoadStream {
    source: SourceId,
    stream: Option<Box<dyn SourceStream>>,
    metadata: DocumentMetadata,
    warnings: WarningSink,
    hasher: Option<Sha256>,
    progress: LoadProgress,
    callback: Option<ProgressCallback>,
    interval: Duration,
    started: Instant,
    last_emit: Instant,
    cancel: Option<CancelToken>,
    finished: bool,
}

impl LoadStream {
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn progress(&self) -> &LoadProgress {
        &self.progress
    }

    /// Consumes the stream, returning the (possibly checksum-stamped)
    /// metadata and accumulated warnings.
    pub fn into_parts(self) -> (DocumentMetadata, Vec<LoadError>) {
        (self.metadata, self.warnings.into_vec())
    }

    fn emit_progress(&mut self, force: bool) {
        let Some(callback) = &self.callback else {
            return;
        };
        let now = Instant::now();
        if force || now.duration_since(self.last_emit) >= self.interval {
            self.last_emit = now;
            callback(&self.progress);
        }
    }

    /// Terminates the stream without finalizing the checksum.
    fn abort(&mut self) {
        self.stream = None;
        self.finished = true;
    }

    /// End-of-stream: stamp the checksum, fire the mandatory final
    /// callback, release the handle.
    fn finalize(&mut self) {
        self.stream = None;
        if let Some(hasher) = self.hasher.take() {
            self.metadata.checksum_sha256 = Some(hex::encode(hasher.finalize()));
        }
        self.progress.update_estimates(self.started);
        if self.progress.total_bytes.is_some() || self.progress.total_chunks.is_some() {
            self.progress.percentage = Some(100.0);
        }
        self.progress.estimated_remaining = Some(Duration::ZERO);
        self.emit_progress(true);
        self.finished = true;
    }

    fn account_chunk(&mut self, raw_len: usize) {
        self.progress.current_chunk += 1;
        self.progress.bytes_processed += raw_len as u64;
        self.progress.update_estimates(self.started);
        self.emit_progress(false);
    }
}

impl Iterator for LoadStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                self.abort();
                return Some(Err(LoadError::cancelled(self.source.clone())));
            }
        }
        let stream = self.stream.as_mut()?;
        match stream.read_chunk() {
            Err(err) => {
                self.abort();
                Some(Err(err))
            }
            Ok(Some(raw)) => {
                if let Some(hasher) = &mut self.hasher {
                    hasher.update(&raw);
                }
                let stream = self.stream.as_mut().expect("stream present");
                match stream.process_chunk(&raw, &mut self.warnings) {
                    Err(err) => {
                        self.abort();
                        Some(Err(err))
                    }
                    Ok(text) => {
                        self.account_chunk(raw.len());
                        Some(Ok(text))
                    }
                }
            }
            Ok(None) => match stream.finish(&mut self.warnings) {
                Err(err) => {
                    self.abort();
                    Some(Err(err))
                }
                Ok(Some(tail)) if !tail.is_empty() => {
                    self.progress.current_chunk += 1;
                    self.finalize();
                    Some(Ok(tail))
                }
                Ok(_) => {
                    self.finalize();
                    None
                }
            },
        }
    }
}

/// Opens a load stream for `source` using `loader`.
///
/// Fails with `UNSUPPORTED_SOURCE` when the loader does not support the
/// source, or with the loader's open/metadata error.
pub fn open_stream(
    loader: &dyn DocumentLoader,
    source: &SourceId,
    options: StreamOptions,
) -> Result<LoadStream> {
    if !loader.supports(source) {
        return Err(LoadError::new(
            ErrorCode::UnsupportedSource,
            source.clone(),
            format!("source not supported by loader: {source}"),
        ));
    }
    let config = loader.config();
    let metadata = loader.extract_metadata(source)?;
    let chunk_size = options.chunk_size.unwrap_or(config.chunk_size).max(1);
    let stream = loader.open(source, chunk_size)?;

    let hashing = options.hashing.unwrap_or(config.hashing_enabled);
    let callback = if config.progress_enabled {
        options.progress
    } else {
        None
    };

    let mut progress = LoadProgress::default();
    progress.total_bytes = stream
        .total_bytes()
        .or((metadata.size_bytes > 0).then_some(metadata.size_bytes));
    progress.total_chunks = stream.total_chunks();

    let started = Instant::now();
    Ok(LoadStream {
        source: source.clone(),
        stream: Some(stream),
        metadata,
        warnings: WarningSink::default(),
        hasher: hashing.then(Sha256::new),
        progress,
        callback,
        interval: options.progress_interval.unwrap_or(config.progress_interval),
        started,
        last_emit: started,
        cancel: options.cancel,
        finished: false,
    })
}

/// Materializes a stream into a [`LoadResult`], capturing elapsed time and
/// every error/warning. Partial chunks produced before a failure are kept.
pub fn load_complete(
    loader: &dyn DocumentLoader,
    source: &SourceId,
    options: StreamOptions,
) -> LoadResult {
    let started = Instant::now();
    let mut stream = match open_stream(loader, source, options) {
        Ok(stream) => stream,
        Err(err) => {
            let mut result = LoadResult::failure(err);
            result.elapsed = started.elapsed();
            return result;
        }
    };

    let mut chunks = Vec::new();
    let mut errors = Vec::new();
    for item in &mut stream {
        match item {
            Ok(text) => chunks.push(text),
            Err(err) => {
                errors.push(err);
                break;
            }
        }
    }

    let ok = errors.is_empty();
    let (metadata, warnings) = stream.into_parts();
    LoadResult {
        ok,
        chunks: Arc::new(chunks),
        metadata: Some(metadata),
        errors,
        warnings,
        elapsed: started.elapsed(),
    }
}
