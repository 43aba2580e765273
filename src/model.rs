//! Core data model for the ingestion pipeline.
//!
//! This module defines the value types shared by every subsystem:
//!
//! - [`SourceId`] - canonical identifier used as the cache key
//! - [`DocumentKind`] - closed enumeration of supported document families
//! - [`LoadProgress`] - progress snapshot delivered to callbacks
//! - [`DocumentMetadata`] - per-document metadata including the streamed
//!   SHA-256 fingerprint
//! - [`LoadResult`] - the materialized outcome of a load
//!
//! All of these are plain values. Progress snapshots and results handed to
//! callbacks are immutable views; sharing of chunk storage is done through
//! `Arc` so a cache hit never copies document content.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{ErrorCode, LoadError};

/// Canonical identifier for a document source.
///
/// File-like sources that exist at construction time are normalized to
/// their absolute canonical path; URLs and arbitrary identifiers are kept
/// verbatim. Equality on `SourceId` defines cache identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(String);

impl SourceId {
    /// Canonicalizes `raw`: existing paths resolve to their absolute form,
    /// everything else is taken verbatim.
    pub fn canonical(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let path = Path::new(raw);
        if path.exists() {
            if let Ok(resolved) = path.canonicalize() {
                return Self(resolved.to_string_lossy().into_owned());
            }
        }
        Self(raw.to_string())
    }

    /// Uses `raw` as-is, skipping filesystem resolution.
    pub fn verbatim(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// Whether the identifier currently names a regular file. Used to decide
    /// if staleness tracking applies.
    pub fn is_file(&self) -> bool {
        Path::new(&self.0).is_file()
    }

    /// Final path component, or the whole identifier for non-path sources.
    pub fn name(&self) -> &str {
        Path::new(&self.0)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.0)
    }

    /// Lowercased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for SourceId {
    fn from(path: &Path) -> Self {
        Self::canonical(path.to_string_lossy())
    }
}

/// Supported document families.
///
/// Used for metadata classification and registry lookup; not a type-system
/// lever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Pdf,
    Csv,
    Json,
    Xml,
    Html,
    RemoteUrl,
    Identifier,
}

impl DocumentKind {
    /// Human-readable label used in row views and file info.
    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::PlainText => "Text Document",
            DocumentKind::Markdown => "Markdown Document",
            DocumentKind::Pdf => "PDF Document",
            DocumentKind::Csv => "CSV File",
            DocumentKind::Json => "JSON File",
            DocumentKind::Xml => "XML File",
            DocumentKind::Html => "HTML Document",
            DocumentKind::RemoteUrl => "Remote URL",
            DocumentKind::Identifier => "Identifier",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress snapshot delivered to progress callbacks.
///
/// `current_chunk` and `bytes_processed` are monotonic within a stream;
/// `percentage` (0..=100) and `estimated_remaining` are derived in
/// [`LoadProgress::update_estimates`] when totals are known.
#[derive(Debug, Clone, Default)]
pub struct LoadProgress {
    pub current_chunk: u64,
    pub total_chunks: Option<u64>,
    pub bytes_processed: u64,
    pub total_bytes: Option<u64>,
    pub percentage: Option<f64>,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
}

impl LoadProgress {
    /// Recomputes `elapsed`, `percentage` and `estimated_remaining` from
    /// the current counters. Percentage prefers byte totals and falls back
    /// to chunk totals.
    pub fn update_estimates(&mut self, started: Instant) {
        self.elapsed = started.elapsed();
        self.percentage = match (self.total_bytes, self.total_chunks) {
            (Some(total), _) if total > 0 => {
                Some((self.bytes_processed as f64 / total as f64 * 100.0).min(100.0))
            }
            (_, Some(total)) if total > 0 => {
                Some((self.current_chunk as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        };
        self.estimated_remaining = self.total_bytes.and_then(|total| {
            let elapsed = self.elapsed.as_secs_f64();
            if self.bytes_processed == 0 || elapsed <= 0.0 {
                return None;
            }
            let remaining = total.saturating_sub(self.bytes_processed);
            let rate = self.bytes_processed as f64 / elapsed;
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        });
    }
}

/// Metadata extracted for a document.
///
/// `checksum_sha256` is populated only after a stream completes
/// successfully; an aborted stream leaves it unset.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub source: SourceId,
    pub kind: DocumentKind,
    pub size_bytes: u64,
    pub checksum_sha256: Option<String>,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub encoding: String,
    pub mime_type: Option<String>,
    pub title: Option<String>,
    pub page_count: Option<u32>,
    pub custom: BTreeMap<String, String>,
}

impl DocumentMetadata {
    pub fn new(source: SourceId, kind: DocumentKind) -> Self {
        Self {
            source,
            kind,
            size_bytes: 0,
            checksum_sha256: None,
            created: None,
            modified: None,
            encoding: "utf-8".to_string(),
            mime_type: None,
            title: None,
            page_count: None,
            custom: BTreeMap::new(),
        }
    }

    /// Approximate in-memory footprint, counted against the cache budget
    /// alongside the document content.
    pub fn footprint(&self) -> u64 {
        let strings = self.source.as_str().len()
            + self.checksum_sha256.as_deref().map_or(0, str::len)
            + self.encoding.len()
            + self.mime_type.as_deref().map_or(0, str::len)
            + self.title.as_deref().map_or(0, str::len)
            + self
                .custom
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>();
        strings as u64 + 96
    }
}

/// Outcome of a complete load: the materialized chunk sequence plus
/// metadata, errors, warnings and timing.
///
/// When `ok` is true the concatenation of `chunks` is the decoded document
/// and `metadata.checksum_sha256` is set. On failure `chunks` holds
/// whatever was produced before the stream terminated.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub ok: bool,
    pub chunks: Arc<Vec<String>>,
    pub metadata: Option<DocumentMetadata>,
    pub errors: Vec<LoadError>,
    pub warnings: Vec<LoadError>,
    pub elapsed: Duration,
}

impl LoadResult {
    pub fn failure(error: LoadError) -> Self {
        Self {
            ok: false,
            chunks: Arc::new(Vec::new()),
            metadata: None,
            errors: vec![error],
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Concatenation of all chunks.
    pub fn text(&self) -> String {
        self.chunks.concat()
    }

    /// UTF-8 size of the materialized content.
    pub fn content_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    /// First error, if the load failed.
    pub fn primary_error(&self) -> Option<&LoadError> {
        self.errors.first()
    }

    /// Whether the load ended due to cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.errors.iter().any(|e| e.code == ErrorCode::Cancelled)
    }
}

/// Progress callback: invoked from worker threads at chunk boundaries, no
/// more often than the configured progress interval.
pub type ProgressCallback = Arc<dyn Fn(&LoadProgress) + Send + Sync>;
/// Completion callback: invoked once per load with the shared result.
pub type CompleteCallback = Arc<dyn Fn(&LoadResult) + Send + Sync>;
/// Error callback: invoked with the primary error of a failed or cancelled
/// load.
pub type ErrorCallback = Arc<dyn Fn(&LoadError) + Send + Sync>;

/// Formats a byte count for display ("1.5 MB").
pub fn format_size(size_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size_bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size_bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM` in UTC. Returns an empty
/// string for unrepresentable times.
pub fn format_timestamp(ts: SystemTime) -> String {
    let secs = match ts.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => return String::new(),
    };
    match time::OffsetDateTime::from_unix_timestamp(secs) {
        Ok(dt) => {
            let format = time::macros::format_description!(
                "[year]-[month]-[day] [hour]:[minute]"
            );
            dt.format(&format).unwrap_or_default()
        }
        Err(_) => String::new(),
    }
}
