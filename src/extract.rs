//! Per-file text extraction and chunking.
//!
//! For each page: take the native PDF text, normalize whitespace, and — when
//! the result is too short to be real content — try OCR. The OCR result is
//! preferred only when it is itself long enough, which protects genuinely
//! short pages from being replaced by recognition noise. Usable page text is
//! split into overlapping word windows.
//!
//! Extraction is a graceful no-op, never an error: a missing capability or a
//! broken file yields an empty chunk list and the batch moves on.

use std::path::Path;

use tracing::{debug, warn};

use crate::capability::Capabilities;
use crate::config::Config;
use crate::models::ChunkRecord;
use crate::store::{record_extraction, MappingStore};

/// Replace non-breaking spaces, collapse whitespace runs, trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split text into overlapping word windows of `window` words advancing by
/// `stride` words. With the defaults (250/220) consecutive chunks share a
/// 30-word overlap: the trailing 30 words of chunk `i` equal the leading 30
/// words of chunk `i+1`.
pub fn chunk_words(text: &str, window: usize, stride: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Extract all chunk records for one file. Returns an empty list when the
/// PDF capability is absent or the file cannot be read.
pub fn extract_chunks(
    caps: &Capabilities,
    mapping: &MappingStore,
    config: &Config,
    path: &Path,
    display_name: &str,
) -> Vec<ChunkRecord> {
    let pages = match caps.pdf.page_texts(path) {
        Ok(pages) => pages,
        Err(e) => {
            warn!("Skipping {}: {}", display_name, e);
            return Vec::new();
        }
    };

    let (resolved_path, resolved_url) = resolve_source(mapping, config, path);
    let min_chars = config.ocr.min_chars;

    let mut records = Vec::new();
    let page_count = pages.len();
    for (i, raw) in pages.into_iter().enumerate() {
        let page = (i + 1) as u32;
        let mut text = normalize_whitespace(&raw);

        if text.chars().count() < min_chars {
            match caps.ocr.page_text(path, page) {
                Ok(recognized) => {
                    let recognized = normalize_whitespace(&recognized);
                    // Prefer OCR only when it clears the same bar, so noise
                    // never replaces a genuinely short page.
                    if recognized.chars().count() >= min_chars {
                        text = recognized;
                    }
                }
                Err(e) => debug!("OCR failed for {} p.{}: {}", display_name, page, e),
            }
        }

        if text.is_empty() {
            continue;
        }

        for chunk in chunk_words(
            &text,
            config.chunking.words_per_chunk,
            config.chunking.stride_words,
        ) {
            records.push(ChunkRecord {
                title: display_name.to_string(),
                page,
                text: chunk,
                path: resolved_path.clone(),
                url: resolved_url.clone(),
            });
        }
    }

    // Non-critical bookkeeping; never aborts extraction.
    record_extraction(&config.storage.data_dir, display_name, page_count, records.len());

    records
}

/// Resolve a display location: mapping entry by basename, then a probe
/// under the configured library folder, then the scanned path itself.
fn resolve_source(
    mapping: &MappingStore,
    config: &Config,
    path: &Path,
) -> (Option<std::path::PathBuf>, Option<String>) {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Some(entry) = mapping.resolve(&basename) {
        return (entry.path.clone(), entry.url.clone());
    }

    if let Some(library) = &config.storage.library_dir {
        let probed = library.join(&basename);
        if probed.is_file() {
            return (Some(probed), None);
        }
    }

    (Some(path.to_path_buf()), None)
}
