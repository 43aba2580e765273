//! # Folio - Streaming Document Ingestion Core
//!
//! Folio is an embeddable document ingestion library: a streaming loader
//! framework over heterogeneous sources, a size- and count-bounded LRU
//! cache over completed load results, and a background worker pool that
//! feeds a virtual-scroll row model with file metadata and content.
//!
//! ## Quick Start
//!
//! ```rust
//! use folio::{CacheConfig, DocumentCache, default_registry};
//! use std::sync::Arc;
//!
//! let cache = DocumentCache::with_registry(
//!     CacheConfig::default(),
//!     Arc::new(default_registry()),
//! );
//!
//! // First access loads through the registry; later accesses hit the
//! // cache until the file changes on disk.
//! if let Some(result) = cache.get("README.md", None) {
//!     println!("{} chunks, ok={}", result.chunks.len(), result.ok);
//! }
//! ```
//!
//! ## Features
//!
//! - **Streaming loaders**: lazy chunked loading with progress callbacks
//!   on a bounded cadence, typed errors and warnings, and a streamed
//!   SHA-256 content fingerprint
//! - **Document cache**: thread-safe LRU bounded by bytes and entries,
//!   with staleness detection against source modification times and
//!   glob-based invalidation
//! - **Async service**: per-source in-flight deduplication, progress
//!   fan-out, previews and a metadata fast path
//! - **Background pool**: priority queue, bounded concurrency, two-tier
//!   retry with exponential backoff, cooperative cancellation
//! - **Row model**: virtualized directory views with batched metadata
//!   faulting and range prefetch
//!
//! ## Architecture
//!
//! Layered, leaves first: loaders stream chunks; the cache owns completed
//! results; the service orchestrates load-or-hit over both; the background
//! pool drives many loads at once; the row model is an independent
//! consumer of directory metadata.

pub mod background;
pub mod cache;
pub mod error;
pub mod exec;
pub mod loader;
pub mod logging;
pub mod model;
pub mod rows;
pub mod service;

// Re-export the main public API
pub use crate::background::{BackgroundLoader, PoolConfig, PoolEvent, Priority, WorkerOutcome};
pub use crate::cache::{CacheConfig, CacheStats, DocumentCache};
pub use crate::error::{CoreError, ErrorCode, ErrorSeverity, LoadError, Result};
pub use crate::exec::CancelToken;
pub use crate::loader::{
    default_registry, load_complete, open_stream, DocumentLoader, LoaderConfig, LoaderRegistry,
    SourceStream, StreamOptions,
};
pub use crate::model::{
    DocumentKind, DocumentMetadata, LoadProgress, LoadResult, SourceId,
};
pub use crate::rows::{CellValue, Column, RowModel, RowModelConfig};
pub use crate::service::{DocumentService, Operation, OperationId, OperationStatus, ServiceConfig};
