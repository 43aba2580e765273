//! Virtualized directory row model.
//!
//! Backs a virtual-scroll view over one directory: the name list is
//! enumerated eagerly (names only, no stat), while per-entry metadata is
//! faulted in batch-wise on demand and kept in a bounded LRU. Rows whose
//! metadata has not arrived yet render a `Loading` placeholder; once the
//! batch is loaded the registered data-changed callback fires with the
//! affected row range so the consumer redraws.
//!
//! The model is self-contained: it never touches the document service, and
//! a single short-lived lock guards the metadata cache, the loaded-batch
//! set and the pending-batch queue.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::nonzero_capacity;
use crate::error::CoreError;
use crate::model::{format_size, format_timestamp};

#[derive(Debug, Clone)]
pub struct RowModelConfig {
    /// Rows whose metadata loads together.
    pub batch_size: usize,
    /// Bound on cached per-entry metadata.
    pub cache_size: usize,
    /// Rows beyond the visible range to prefetch.
    pub fetch_distance: usize,
}

impl Default for RowModelConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            cache_size: 500,
            fetch_distance: 5,
        }
    }
}

/// Stat-derived metadata for one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMeta {
    pub size_bytes: u64,
    pub kind_label: String,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

/// Columns of the row view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    Size,
    Kind,
    Modified,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Name, Column::Size, Column::Kind, Column::Modified];

    pub fn header(self) -> &'static str {
        match self {
            Column::Name => "Name",
            Column::Size => "Size",
            Column::Kind => "Type",
            Column::Modified => "Modified",
        }
    }
}

/// Cell payload. `Loading` means the batch fault is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Loading,
    Empty,
}

/// Opaque icon handle keyed by file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconToken(String);

impl IconToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metadata-cache counters plus batch coverage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
    pub loaded_batches: usize,
    pub total_batches: usize,
}

/// Display-friendly info for one row.
#[derive(Debug, Clone)]
pub struct RowFileInfo {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub kind_label: String,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

type DataChangedCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

struct RowState {
    meta: LruCache<PathBuf, RowMeta>,
    loaded_batches: HashSet<usize>,
    pending_batches: BTreeSet<usize>,
    hits: u64,
    misses: u64,
}

/// Virtualized row model over one directory.
pub struct RowModel {
    config: RowModelConfig,
    root: PathBuf,
    entries: Vec<String>,
    state: Mutex<RowState>,
    icons: Mutex<HashMap<String, IconToken>>,
    on_data_changed: Option<DataChangedCallback>,
}

impl RowModel {
    pub fn new(config: RowModelConfig) -> Self {
        let capacity = nonzero_capacity(config.cache_size);
        let mut icons = HashMap::new();
        // Defaults pinned; extension tokens populate lazily.
        icons.insert("folder".to_string(), IconToken("folder".to_string()));
        icons.insert("file".to_string(), IconToken("file".to_string()));
        Self {
            config,
            root: PathBuf::new(),
            entries: Vec::new(),
            state: Mutex::new(RowState {
                meta: LruCache::new(capacity),
                loaded_batches: HashSet::new(),
                pending_batches: BTreeSet::new(),
                hits: 0,
                misses: 0,
            }),
            icons: Mutex::new(icons),
            on_data_changed: None,
        }
    }

    /// Registers the redraw hook invoked with `(first_row, last_row)`
    /// after a batch completes.
    pub fn set_data_changed_callback(
        &mut self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) {
        self.on_data_changed = Some(Box::new(callback));
    }

    /// Points the model at a directory: enumerate names only (no stat),
    /// sort lexicographically, reset every cache.
    pub fn set_root(&mut self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(CoreError::InvalidArgument(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        self.root = path.to_path_buf();
        self.entries = names;
        let mut state = self.state.lock();
        state.meta.clear();
        state.loaded_batches.clear();
        state.pending_batches.clear();
        state.hits = 0;
        state.misses = 0;
        debug!(root = %self.root.display(), rows = self.entries.len(), "row model reset");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn row_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_batches(&self) -> usize {
        self.entries.len().div_ceil(self.config.batch_size.max(1))
    }

    pub fn name(&self, row: usize) -> Option<&str> {
        self.entries.get(row).map(String::as_str)
    }

    fn path_for(&self, row: usize) -> Option<PathBuf> {
        self.entries.get(row).map(|name| self.root.join(name))
    }

    fn batch_of(&self, row: usize) -> usize {
        row / self.config.batch_size.max(1)
    }

    /// Cell value for `(row, column)`.
    ///
    /// Name cells answer from the eager name list. Other columns consult
    /// the metadata cache; on a miss the covering batch is recorded as
    /// pending and `Loading` is returned so the caller can render a
    /// placeholder until [`RowModel::load_pending`] (or a prefetch)
    /// completes the batch.
    pub fn data(&self, row: usize, column: Column) -> CellValue {
        if row >= self.entries.len() {
            return CellValue::Empty;
        }
        if column == Column::Name {
            return CellValue::Text(self.entries[row].clone());
        }
        let Some(path) = self.path_for(row) else {
            return CellValue::Empty;
        };
        let mut state = self.state.lock();
        let cached = state.meta.get(&path).cloned();
        match cached {
            Some(meta) => {
                state.hits += 1;
                drop(state);
                render_cell(&meta, column)
            }
            None => {
                state.misses += 1;
                let batch = self.batch_of(row);
                if !state.loaded_batches.contains(&batch) {
                    state.pending_batches.insert(batch);
                }
                CellValue::Loading
            }
        }
    }

    /// Synchronously stats one batch of entries and marks it loaded.
    /// Already-loaded batches are never re-stat'ed.
    pub fn ensure_batch(&self, batch: usize) {
        let batch_size = self.config.batch_size.max(1);
        let start = batch * batch_size;
        if start >= self.entries.len() {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.loaded_batches.contains(&batch) {
                state.pending_batches.remove(&batch);
                return;
            }
        }
        let end = (start + batch_size).min(self.entries.len());
        let mut loaded: Vec<(PathBuf, RowMeta)> = Vec::with_capacity(end - start);
        for row in start..end {
            if let Some(path) = self.path_for(row) {
                let needs = self.state.lock().meta.peek(&path).is_none();
                if needs {
                    let meta = stat_row(&path);
                    loaded.push((path, meta));
                }
            }
        }
        {
            let mut state = self.state.lock();
            for (path, meta) in loaded {
                state.meta.put(path, meta);
            }
            state.loaded_batches.insert(batch);
            state.pending_batches.remove(&batch);
        }
        if let Some(callback) = &self.on_data_changed {
            callback(start, end - 1);
        }
    }

    /// Loads every batch recorded as pending by [`RowModel::data`].
    /// Returns the number of batches loaded.
    pub fn load_pending(&self) -> usize {
        let pending: Vec<usize> = {
            let state = self.state.lock();
            state.pending_batches.iter().copied().collect()
        };
        for &batch in &pending {
            self.ensure_batch(batch);
        }
        pending.len()
    }

    /// Ensures metadata for the visible range plus `fetch_distance` rows
    /// on each side. Idempotent: covered batches are skipped.
    pub fn prefetch(&self, first: usize, last: usize) {
        if self.entries.is_empty() {
            return;
        }
        let first = first.saturating_sub(self.config.fetch_distance);
        let last = (last + self.config.fetch_distance).min(self.entries.len() - 1);
        let from = self.batch_of(first);
        let to = self.batch_of(last);
        for batch in from..=to {
            self.ensure_batch(batch);
        }
    }

    /// Sorts the entries. Sorting by a metadata column synchronously loads
    /// metadata for every entry first, which defeats virtualization for
    /// very large directories; callers sorting huge listings should prefer
    /// `Column::Name`.
    pub fn sort(&mut self, column: Column, descending: bool) {
        if column != Column::Name {
            for batch in 0..self.total_batches() {
                self.ensure_batch(batch);
            }
        }
        let root = self.root.clone();
        let state = self.state.get_mut();
        self.entries.sort_by(|a, b| {
            let ordering = match column {
                Column::Name => a.to_lowercase().cmp(&b.to_lowercase()),
                _ => {
                    let meta_a = state.meta.peek(&root.join(a));
                    let meta_b = state.meta.peek(&root.join(b));
                    match (meta_a, meta_b) {
                        (Some(ma), Some(mb)) => match column {
                            Column::Size => ma.size_bytes.cmp(&mb.size_bytes),
                            Column::Kind => ma.kind_label.cmp(&mb.kind_label),
                            Column::Modified => ma.modified.cmp(&mb.modified),
                            Column::Name => unreachable!(),
                        },
                        (Some(_), None) => std::cmp::Ordering::Greater,
                        (None, Some(_)) => std::cmp::Ordering::Less,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                }
            };
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        // Row/batch correspondence changed wholesale.
        state.loaded_batches.clear();
        state.pending_batches.clear();
        if let Some(callback) = &self.on_data_changed {
            if !self.entries.is_empty() {
                callback(0, self.entries.len() - 1);
            }
        }
    }

    /// Icon token for an entry, keyed by extension; `folder`/`file`
    /// defaults are pinned.
    pub fn icon_token(&self, name: &str, is_dir: bool) -> IconToken {
        if is_dir {
            return IconToken("folder".to_string());
        }
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let Some(ext) = ext else {
            return IconToken("file".to_string());
        };
        let mut icons = self.icons.lock();
        icons
            .entry(ext.clone())
            .or_insert_with(|| IconToken(format!("ext:{ext}")))
            .clone()
    }

    /// Full info for one row, loading its metadata if necessary.
    pub fn file_info(&self, row: usize) -> Option<RowFileInfo> {
        let name = self.entries.get(row)?.clone();
        let path = self.path_for(row)?;
        let cached = self.state.lock().meta.peek(&path).cloned();
        let meta = match cached {
            Some(meta) => meta,
            None => {
                let meta = stat_row(&path);
                self.state.lock().meta.put(path.clone(), meta.clone());
                meta
            }
        };
        Some(RowFileInfo {
            path,
            name,
            size_bytes: meta.size_bytes,
            kind_label: meta.kind_label,
            modified: meta.modified,
            is_dir: meta.is_dir,
        })
    }

    pub fn stats(&self) -> RowCacheStats {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        RowCacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.meta.len(),
            hit_rate: state.hits as f64 / lookups.max(1) as f64,
            loaded_batches: state.loaded_batches.len(),
            total_batches: self.total_batches(),
        }
    }

    /// Re-enumerates the current root.
    pub fn refresh(&mut self) -> Result<(), CoreError> {
        if self.root.as_os_str().is_empty() {
            return Ok(());
        }
        let root = self.root.clone();
        self.set_root(root)
    }
}

fn render_cell(meta: &RowMeta, column: Column) -> CellValue {
    match column {
        Column::Name => CellValue::Empty,
        Column::Size => {
            if meta.is_dir {
                CellValue::Empty
            } else {
                CellValue::Text(format_size(meta.size_bytes))
            }
        }
        Column::Kind => CellValue::Text(meta.kind_label.clone()),
        Column::Modified => match meta.modified {
            Some(ts) => CellValue::Text(format_timestamp(ts)),
            None => CellValue::Empty,
        },
    }
}

/// One stat call; unreadable entries get placeholder metadata.
fn stat_row(path: &Path) -> RowMeta {
    match std::fs::metadata(path) {
        Ok(stat) => {
            let is_dir = stat.is_dir();
            let kind_label = if is_dir {
                "Folder".to_string()
            } else {
                match path.extension().and_then(|e| e.to_str()) {
                    Some(ext) => ext.to_ascii_uppercase(),
                    None => "File".to_string(),
                }
            };
            RowMeta {
                size_bytes: if is_dir { 0 } else { stat.len() },
                kind_label,
                modified: stat.modified().ok(),
                is_dir,
            }
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "stat failed; placeholder metadata");
            RowMeta {
                size_bytes: 0,
                kind_label: "Unknown".to_string(),
                modified: None,
                is_dir: false,
            }
        }
    }
}
