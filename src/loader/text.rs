//! Byte-stream loaders for the text document family.
//!
//! [`TextLoader`] covers plain text plus the structured-text kinds (JSON,
//! XML, HTML) that stream identically and differ only in extension set,
//! kind and MIME type. The markdown loader reuses [`FileTextStream`] and
//! adds heading-based title extraction (see `markdown.rs`).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{LoadError, Result};
use crate::loader::decode::{TextDecoder, DEFAULT_FALLBACK_ENCODINGS};
use crate::loader::{DocumentLoader, LoaderConfig, SourceStream, WarningSink};
use crate::model::{DocumentKind, DocumentMetadata, SourceId};

/// Streams a file in fixed-size byte chunks through a [`TextDecoder`].
pub(crate) struct FileTextStream {
    source: SourceId,
    file: File,
    chunk_size: usize,
    size: u64,
    decoder: TextDecoder,
}

impl FileTextStream {
    pub(crate) fn open(
        source: &SourceId,
        chunk_size: usize,
        fallbacks: &[&str],
    ) -> Result<Self> {
        let file =
            File::open(source.to_path()).map_err(|e| LoadError::from_open(source.clone(), e))?;
        let size = file
            .metadata()
            .map_err(|e| LoadError::from_open(source.clone(), e))?
            .len();
        Ok(Self {
            source: source.clone(),
            file,
            chunk_size,
            size,
            decoder: TextDecoder::new(fallbacks),
        })
    }
}

impl SourceStream for FileTextStream {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self
            .file
            .read(&mut buf)
            .map_err(|e| LoadError::from_read(self.source.clone(), e))?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    fn process_chunk(&mut self, raw: &[u8], warnings: &mut WarningSink) -> Result<String> {
        Ok(self.decoder.decode(raw, &self.source, warnings))
    }

    fn finish(&mut self, warnings: &mut WarningSink) -> Result<Option<String>> {
        Ok(self.decoder.finish(&self.source, warnings))
    }

    fn total_bytes(&self) -> Option<u64> {
        Some(self.size)
    }

    fn total_chunks(&self) -> Option<u64> {
        Some(self.size.div_ceil(self.chunk_size.max(1) as u64))
    }
}

/// Counts newlines without materializing the file. Best effort: `None` on
/// any I/O error.
pub(crate) fn count_lines(path: &Path) -> Option<u64> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut lines = 0u64;
    loop {
        let buf = reader.fill_buf().ok()?;
        if buf.is_empty() {
            break;
        }
        lines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        let len = buf.len();
        reader.consume(len);
    }
    Some(lines)
}

/// Stat-derived base metadata shared by the file-backed loaders.
pub(crate) fn file_metadata(source: &SourceId, kind: DocumentKind) -> Result<DocumentMetadata> {
    let stat = std::fs::metadata(source.to_path())
        .map_err(|e| LoadError::from_open(source.clone(), e))?;
    let mut metadata = DocumentMetadata::new(source.clone(), kind);
    metadata.size_bytes = stat.len();
    metadata.modified = stat.modified().ok();
    metadata.created = stat.created().ok();
    metadata.title = Some(source.name().to_string());
    metadata.mime_type = mime_guess::from_path(source.to_path())
        .first()
        .map(|m| m.essence_str().to_string());
    if let Some(ext) = source.extension() {
        metadata.custom.insert("extension".into(), format!(".{ext}"));
    }
    Ok(metadata)
}

/// Extension-dispatched loader for plain and structured text files.
pub struct TextLoader {
    kind: DocumentKind,
    extensions: &'static [&'static str],
    mime_type: &'static str,
    fallback_encodings: Vec<&'static str>,
    config: LoaderConfig,
}

impl TextLoader {
    fn family(
        kind: DocumentKind,
        extensions: &'static [&'static str],
        mime_type: &'static str,
        config: LoaderConfig,
    ) -> Self {
        Self {
            kind,
            extensions,
            mime_type,
            fallback_encodings: DEFAULT_FALLBACK_ENCODINGS.to_vec(),
            config,
        }
    }

    /// Plain text: `.txt`, `.log`, `.text`.
    pub fn plain(config: LoaderConfig) -> Self {
        Self::family(
            DocumentKind::PlainText,
            &["txt", "log", "text"],
            "text/plain",
            config,
        )
    }

    pub fn json(config: LoaderConfig) -> Self {
        Self::family(DocumentKind::Json, &["json"], "application/json", config)
    }

    pub fn xml(config: LoaderConfig) -> Self {
        Self::family(DocumentKind::Xml, &["xml"], "application/xml", config)
    }

    pub fn html(config: LoaderConfig) -> Self {
        Self::family(DocumentKind::Html, &["html", "htm"], "text/html", config)
    }
}

impl DocumentLoader for TextLoader {
    fn kinds(&self) -> &'static [DocumentKind] {
        match self.kind {
            DocumentKind::Json => &[DocumentKind::Json],
            DocumentKind::Xml => &[DocumentKind::Xml],
            DocumentKind::Html => &[DocumentKind::Html],
            _ => &[DocumentKind::PlainText],
        }
    }

    fn supports(&self, source: &SourceId) -> bool {
        let Some(ext) = source.extension() else {
            return false;
        };
        self.extensions.contains(&ext.as_str()) && source.is_file()
    }

    fn open(&self, source: &SourceId, chunk_size: usize) -> Result<Box<dyn SourceStream>> {
        Ok(Box::new(FileTextStream::open(
            source,
            chunk_size,
            &self.fallback_encodings,
        )?))
    }

    fn extract_metadata(&self, source: &SourceId) -> Result<DocumentMetadata> {
        let mut metadata = file_metadata(source, self.kind)?;
        metadata.mime_type.get_or_insert_with(|| self.mime_type.to_string());
        if let Some(lines) = count_lines(&source.to_path()) {
            metadata.custom.insert("line_count".into(), lines.to_string());
        }
        Ok(metadata)
    }

    fn config(&self) -> &LoaderConfig {
        &self.config
    }
}
