//! Incremental text decoding with encoding fallbacks.
//!
//! Byte-oriented loaders read fixed-size chunks, which can split a
//! multi-byte sequence at a chunk boundary. [`TextDecoder`] carries the
//! incomplete tail across calls so decoded output never contains torn
//! characters. Decoding tries the primary encoding (strict UTF-8), then an
//! ordered fallback list resolved through `encoding_rs` labels, then a
//! lossy replace. The first successful fallback is locked in for the rest
//! of the stream and reported once as an `ENCODING_FALLBACK` warning; a
//! lossy replace is reported once as `LOSSY_DECODING`.

use encoding_rs::Encoding;

use crate::error::{ErrorCode, LoadError};
use crate::loader::WarningSink;
use crate::model::SourceId;

/// Default fallback chain tried after strict UTF-8, in order. Labels are
/// WHATWG encoding labels; note that `latin-1` resolves to the
/// windows-1252 decoder there, so both entries are honored even though
/// they share a decoder table.
pub const DEFAULT_FALLBACK_ENCODINGS: &[&str] = &["latin-1", "windows-1252"];

#[derive(Debug)]
pub struct TextDecoder {
    fallbacks: Vec<&'static Encoding>,
    /// Set once a fallback engages; all later chunks use it directly.
    chosen: Option<&'static Encoding>,
    /// Incomplete trailing UTF-8 sequence carried to the next chunk.
    carry: Vec<u8>,
}

impl TextDecoder {
    /// Builds a decoder with the given fallback labels. Unknown labels are
    /// skipped.
    pub fn new(fallback_labels: &[&str]) -> Self {
        let fallbacks = fallback_labels
            .iter()
            .filter_map(|label| Encoding::for_label(label.as_bytes()))
            .collect();
        Self {
            fallbacks,
            chosen: None,
            carry: Vec::new(),
        }
    }

    /// Decodes one raw chunk, prepending any carried bytes.
    pub fn decode(&mut self, raw: &[u8], source: &SourceId, warnings: &mut WarningSink) -> String {
        let buf = if self.carry.is_empty() {
            raw.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(raw);
            joined
        };

        if let Some(encoding) = self.chosen {
            let (text, _, _) = encoding.decode(&buf);
            return text.into_owned();
        }

        match std::str::from_utf8(&buf) {
            Ok(text) => text.to_string(),
            Err(err) if err.error_len().is_none() => {
                // Clean prefix with an incomplete sequence at the end:
                // hold the tail back for the next chunk.
                let valid = err.valid_up_to();
                self.carry = buf[valid..].to_vec();
                String::from_utf8_lossy(&buf[..valid]).into_owned()
            }
            Err(_) => self.fall_back(&buf, source, warnings),
        }
    }

    /// Flushes carried bytes at end of stream. An incomplete trailing
    /// sequence at EOF decodes lossily.
    pub fn finish(&mut self, source: &SourceId, warnings: &mut WarningSink) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.carry);
        if let Some(encoding) = self.chosen {
            let (text, _, _) = encoding.decode(&tail);
            return Some(text.into_owned());
        }
        warnings.push_once(LoadError::warning(
            ErrorCode::LossyDecoding,
            source.clone(),
            "replaced incomplete byte sequence at end of stream",
        ));
        Some(String::from_utf8_lossy(&tail).into_owned())
    }

    fn fall_back(&mut self, buf: &[u8], source: &SourceId, warnings: &mut WarningSink) -> String {
        for encoding in &self.fallbacks {
            let (text, _, had_errors) = encoding.decode(buf);
            if !had_errors {
                warnings.push_once(LoadError::warning(
                    ErrorCode::EncodingFallback,
                    source.clone(),
                    format!("falling back to {} encoding", encoding.name()),
                ));
                self.chosen = Some(encoding);
                return text.into_owned();
            }
        }
        warnings.push_once(LoadError::warning(
            ErrorCode::LossyDecoding,
            source.clone(),
            "replacing undecodable bytes",
        ));
        String::from_utf8_lossy(buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceId {
        SourceId::verbatim("mem:doc")
    }

    #[test]
    fn default_fallback_chain_is_latin1_then_windows1252() {
        assert_eq!(DEFAULT_FALLBACK_ENCODINGS, &["latin-1", "windows-1252"]);
        // Every label in the default chain must resolve.
        for label in DEFAULT_FALLBACK_ENCODINGS {
            assert!(
                Encoding::for_label(label.as_bytes()).is_some(),
                "unresolvable encoding label: {label}"
            );
        }
    }

    #[test]
    fn clean_utf8_passes_through() {
        let mut decoder = TextDecoder::new(DEFAULT_FALLBACK_ENCODINGS);
        let mut warnings = WarningSink::default();
        let text = decoder.decode("héllo".as_bytes(), &source(), &mut warnings);
        assert_eq!(text, "héllo");
        assert!(warnings.is_empty());
    }

    #[test]
    fn split_multibyte_sequence_is_carried() {
        let mut decoder = TextDecoder::new(DEFAULT_FALLBACK_ENCODINGS);
        let mut warnings = WarningSink::default();
        let bytes = "é".as_bytes(); // two bytes
        let first = decoder.decode(&bytes[..1], &source(), &mut warnings);
        assert_eq!(first, "");
        let second = decoder.decode(&bytes[1..], &source(), &mut warnings);
        assert_eq!(second, "é");
        assert!(warnings.is_empty());
        assert!(decoder.finish(&source(), &mut warnings).is_none());
    }

    #[test]
    fn fallback_engages_once() {
        let mut decoder = TextDecoder::new(DEFAULT_FALLBACK_ENCODINGS);
        let mut warnings = WarningSink::default();
        // 0xE9 alone is invalid UTF-8 but decodes as 'é' in windows-1252.
        let text = decoder.decode(&[b'c', b'a', b'f', 0xE9, b'!'], &source(), &mut warnings);
        assert_eq!(text, "café!");
        let collected = warnings.into_vec();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].code, ErrorCode::EncodingFallback);

        // Subsequent chunks reuse the chosen encoding without warning again.
        let mut warnings = WarningSink::default();
        let text = decoder.decode(&[0xE9], &source(), &mut warnings);
        assert_eq!(text, "é");
        assert!(warnings.is_empty());
    }

    #[test]
    fn incomplete_tail_at_eof_is_lossy() {
        let mut decoder = TextDecoder::new(&[]);
        let mut warnings = WarningSink::default();
        let bytes = "é".as_bytes();
        let _ = decoder.decode(&bytes[..1], &source(), &mut warnings);
        let tail = decoder.finish(&source(), &mut warnings).expect("tail");
        assert_eq!(tail, "\u{FFFD}");
        let collected = warnings.into_vec();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].code, ErrorCode::LossyDecoding);
    }
}
