//! PDF loader.
//!
//! Rendering is out of scope; this loader surfaces metadata (page count,
//! title when stored in the clear) and a best-effort text stream. Streaming
//! reads the file in byte chunks and extracts PDF literal strings — the
//! `(...)` operands of uncompressed content streams — carrying parser state
//! across chunk boundaries. Compressed streams yield little or no text;
//! every stream is flagged once with a `LOSSY_DECODING` warning to mark the
//! extraction as approximate.

use std::fs::File;
use std::io::Read;

use crate::error::{ErrorCode, LoadError, Result};
use crate::loader::text::file_metadata;
use crate::loader::{DocumentLoader, LoaderConfig, SourceStream, WarningSink};
use crate::model::{DocumentKind, DocumentMetadata, SourceId};

pub struct PdfLoader {
    config: LoaderConfig,
}

impl PdfLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }
}

/// Incremental extractor for PDF literal strings. Tracks parenthesis
/// nesting and backslash escapes so strings split across chunk boundaries
/// come out whole.
#[derive(Default)]
struct LiteralStringScanner {
    depth: u32,
    escaped: bool,
    current: String,
}

impl LiteralStringScanner {
    fn push_chunk(&mut self, raw: &[u8]) -> String {
        let mut out = String::new();
        for &byte in raw {
            if self.depth == 0 {
                if byte == b'(' {
                    self.depth = 1;
                    self.current.clear();
                }
                continue;
            }
            if self.escaped {
                self.escaped = false;
                match byte {
                    b'n' => self.current.push('\n'),
                    b't' => self.current.push('\t'),
                    b'(' | b')' | b'\\' => self.current.push(byte as char),
                    _ => {}
                }
                continue;
            }
            match byte {
                b'\\' => self.escaped = true,
                b'(' => {
                    self.depth += 1;
                    self.current.push('(');
                }
                b')' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.flush(&mut out);
                    } else {
                        self.current.push(')');
                    }
                }
                0x20..=0x7E => self.current.push(byte as char),
                b'\n' | b'\r' => self.current.push(' '),
                _ => {}
            }
        }
        out
    }

    fn flush(&mut self, out: &mut String) {
        let text = self.current.trim();
        // Skip noise: single glyphs and hex-looking identifiers.
        if text.len() >= 2 && text.chars().any(|c| c.is_alphabetic()) {
            out.push_str(text);
            out.push('\n');
        }
        self.current.clear();
    }
}

struct PdfStream {
    source: SourceId,
    file: File,
    chunk_size: usize,
    size: u64,
    scanner: LiteralStringScanner,
    warned: bool,
}

impl SourceStream for PdfStream {
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
        if !self.warned {
            self.warned = true;
            warnings.push_once(LoadError::warning(
                ErrorCode::LossyDecoding,
                self.source.clone(),
                "best-effort PDF text extraction; compressed content is skipped",
            ));
        }
        Ok(self.scanner.push_chunk(raw))
    }

    fn total_bytes(&self) -> Option<u64> {
        Some(self.size)
    }

    fn total_chunks(&self) -> Option<u64> {
        Some(self.size.div_ceil(self.chunk_size.max(1) as u64))
    }
}

/// Counts page objects (`/Type /Page`, excluding the `/Pages` tree nodes).
fn count_pages(data: &[u8]) -> u32 {
    let mut pages = 0u32;
    let mut i = 0;
    while let Some(pos) = find(&data[i..], b"/Type") {
        let mut j = i + pos + b"/Type".len();
        while j < data.len() && (data[j] == b' ' || data[j] == b'\r' || data[j] == b'\n') {
            j += 1;
        }
        if data[j..].starts_with(b"/Pages") {
            // interior node of the page tree
        } else if data[j..].starts_with(b"/Page") {
            pages += 1;
        }
        i += pos + b"/Type".len();
    }
    pages
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// `/Title (...)` from the document info dictionary, when uncompressed.
fn find_title(data: &[u8]) -> Option<String> {
    let pos = find(data, b"/Title")?;
    let rest = &data[pos + b"/Title".len()..];
    let open = rest.iter().position(|&b| b == b'(')?;
    let close = rest[open..].iter().position(|&b| b == b')')?;
    let raw = &rest[open + 1..open + close];
    let title: String = raw
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect();
    let title = title.trim().to_string();
    (!title.is_empty()).then_some(title)
}

impl DocumentLoader for PdfLoader {
    fn kinds(&self) -> &'static [DocumentKind] {
        &[DocumentKind::Pdf]
    }

    fn supports(&self, source: &SourceId) -> bool {
        source.extension().as_deref() == Some("pdf") && source.is_file()
    }

    fn open(&self, source: &SourceId, chunk_size: usize) -> Result<Box<dyn SourceStream>> {
        let mut file =
            File::open(source.to_path()).map_err(|e| LoadError::from_open(source.clone(), e))?;
        let size = file
            .metadata()
            .map_err(|e| LoadError::from_open(source.clone(), e))?
            .len();
        let mut magic = [0u8; 5];
        let n = file
            .read(&mut magic)
            .map_err(|e| LoadError::from_read(source.clone(), e))?;
        if &magic[..n] != b"%PDF-" {
            return Err(LoadError::new(
                ErrorCode::DecodeFailed,
                source.clone(),
                "missing %PDF- header",
            ));
        }
        // Reopen so the stream (and the hash) covers the whole file.
        let file =
            File::open(source.to_path()).map_err(|e| LoadError::from_open(source.clone(), e))?;
        Ok(Box::new(PdfStream {
            source: source.clone(),
            file,
            chunk_size,
            size,
            scanner: LiteralStringScanner::default(),
            warned: false,
        }))
    }

    fn extract_metadata(&self, source: &SourceId) -> Result<DocumentMetadata> {
        let mut metadata = file_metadata(source, DocumentKind::Pdf)?;
        metadata.mime_type = Some("application/pdf".to_string());
        let data = std::fs::read(source.to_path())
            .map_err(|e| LoadError::from_open(source.clone(), e))?;
        let pages = count_pages(&data);
        if pages > 0 {
            metadata.page_count = Some(pages);
        }
        if let Some(title) = find_title(&data) {
            metadata.title = Some(title);
        }
        Ok(metadata)
    }

    fn config(&self) -> &LoaderConfig {
        &self.config
    }
}
