//! Shared helpers for the integration scenarios: scriptable in-memory
//! loaders with controllable failure and latency.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use folio::loader::WarningSink;
use folio::{
    DocumentKind, DocumentLoader, DocumentMetadata, ErrorCode, LoadError, LoaderConfig,
    LoaderRegistry, SourceId, SourceStream,
};

/// In-memory loader: serves `chunks` per stream, optionally sleeping per
/// chunk and failing the first `fail_opens` open calls with `READ_FAILED`.
pub struct ScriptedLoader {
    chunks: Vec<Vec<u8>>,
    chunk_delay: Duration,
    fail_opens: usize,
    opens: AtomicUsize,
    config: LoaderConfig,
}

impl ScriptedLoader {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            chunk_delay: Duration::ZERO,
            fail_opens: 0,
            opens: AtomicUsize::new(0),
            config: LoaderConfig::default(),
        }
    }

    pub fn slow(chunks: Vec<Vec<u8>>, chunk_delay: Duration) -> Self {
        let mut loader = Self::new(chunks);
        loader.chunk_delay = chunk_delay;
        loader
    }

    pub fn flaky(chunks: Vec<Vec<u8>>, fail_opens: usize) -> Self {
        let mut loader = Self::new(chunks);
        loader.fail_opens = fail_opens;
        loader
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct ScriptedStream {
    source: SourceId,
    chunks: std::vec::IntoIter<Vec<u8>>,
    delay: Duration,
    total: u64,
}

impl SourceStream for ScriptedStream {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, LoadError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.chunks.next())
    }

    fn process_chunk(
        &mut self,
        raw: &[u8],
        _warnings: &mut WarningSink,
    ) -> Result<String, LoadError> {
        String::from_utf8(raw.to_vec()).map_err(|e| {
            LoadError::new(ErrorCode::DecodeFailed, self.source.clone(), e.to_string())
        })
    }

    fn total_bytes(&self) -> Option<u64> {
        Some(self.total)
    }
}

impl DocumentLoader for ScriptedLoader {
    fn kinds(&self) -> &'static [DocumentKind] {
        &[DocumentKind::PlainText]
    }

    fn supports(&self, _source: &SourceId) -> bool {
        true
    }

    fn open(
        &self,
        source: &SourceId,
        _chunk_size: usize,
    ) -> Result<Box<dyn SourceStream>, LoadError> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_opens {
            return Err(LoadError::new(
                ErrorCode::ReadFailed,
                source.clone(),
                "scripted transient failure",
            ));
        }
        Ok(Box::new(ScriptedStream {
            source: source.clone(),
            total: self.chunks.iter().map(|c| c.len() as u64).sum(),
            chunks: self.chunks.clone().into_iter(),
            delay: self.chunk_delay,
        }))
    }

    fn extract_metadata(&self, source: &SourceId) -> Result<DocumentMetadata, LoadError> {
        let mut metadata = DocumentMetadata::new(source.clone(), DocumentKind::PlainText);
        metadata.size_bytes = self.chunks.iter().map(|c| c.len() as u64).sum();
        Ok(metadata)
    }

    fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

pub fn registry_of(loader: ScriptedLoader) -> Arc<LoaderRegistry> {
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::new(loader));
    Arc::new(registry)
}
