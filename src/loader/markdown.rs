//! Markdown loader.
//!
//! Streams like the plain-text loader; metadata additionally carries a
//! title taken from the first heading line, falling back to the file name.

use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::error::Result;
use crate::loader::decode::DEFAULT_FALLBACK_ENCODINGS;
use crate::loader::text::{count_lines, file_metadata, FileTextStream};
use crate::loader::{DocumentLoader, LoaderConfig, SourceStream};
use crate::model::{DocumentKind, DocumentMetadata, SourceId};

pub struct MarkdownLoader {
    config: LoaderConfig,
}

impl MarkdownLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }
}

/// First `#`-heading in the file, stripped of markers. Best effort.
fn heading_title(source: &SourceId) -> Option<String> {
    let file = File::open(source.to_path()).ok()?;
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = line.ok()?;
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#').trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

impl DocumentLoader for MarkdownLoader {
    fn kinds(&self) -> &'static [DocumentKind] {
        &[DocumentKind::Markdown]
    }

    fn supports(&self, source: &SourceId) -> bool {
        matches!(
            source.extension().as_deref(),
            Some("md" | "markdown" | "mdown")
        ) && source.is_file()
    }

    fn open(&self, source: &SourceId, chunk_size: usize) -> Result<Box<dyn SourceStream>> {
        Ok(Box::new(FileTextStream::open(
            source,
            chunk_size,
            DEFAULT_FALLBACK_ENCODINGS,
        )?))
    }

    fn extract_metadata(&self, source: &SourceId) -> Result<DocumentMetadata> {
        let mut metadata = file_metadata(source, DocumentKind::Markdown)?;
        metadata.mime_type = Some("text/markdown".to_string());
        if let Some(title) = heading_title(source) {
            metadata.title = Some(title);
        }
        if let Some(lines) = count_lines(&source.to_path()) {
            metadata.custom.insert("line_count".into(), lines.to_string());
        }
        Ok(metadata)
    }

    fn config(&self) -> &LoaderConfig {
        &self.config
    }
}
