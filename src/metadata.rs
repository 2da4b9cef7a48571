//! The metadata store: the canonical ordered list of chunk records.
//!
//! Two on-disk shapes are accepted. The current shape is a flat array of
//! per-page chunk objects (`{title, page, text, path?, url?}`). A legacy
//! shape is an array of per-document objects, each nesting its textual
//! pieces under one of several known keys; the loader detects the shape
//! once and normalizes everything into [`ChunkRecord`]s before anything
//! downstream sees the data. Unrecognizable data loads as an empty store.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::ChunkRecord;
use crate::store::save_json;

pub const CHUNKS_FILE: &str = "chunks.json";

/// Known legacy nesting keys, tried in priority order; the first key that
/// yields data wins.
const LEGACY_TEXT_KEYS: &[&str] = &["chunks", "pages", "texts"];

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    pub records: Vec<ChunkRecord>,
}

impl MetadataStore {
    pub fn file_path(data_dir: &Path) -> PathBuf {
        data_dir.join(CHUNKS_FILE)
    }

    pub fn exists(data_dir: &Path) -> bool {
        Self::file_path(data_dir).exists()
    }

    pub fn load(data_dir: &Path) -> Self {
        let path = Self::file_path(data_dir);
        let records = load_records(&path);
        Self { path, records }
    }

    pub fn save(&self) -> Result<()> {
        save_json(&self.path, &self.records)
    }

    /// On-disk modification time, used by the lexical index's staleness check.
    pub fn mtime(data_dir: &Path) -> Option<SystemTime> {
        std::fs::metadata(Self::file_path(data_dir))
            .and_then(|m| m.modified())
            .ok()
    }

    pub fn replace_all(&mut self, records: Vec<ChunkRecord>) {
        self.records = records;
    }

    pub fn append(&mut self, records: Vec<ChunkRecord>) {
        self.records.extend(records);
    }

    /// Remove a file's previous chunk set before re-inserting the fresh
    /// extraction. Matches by resolved path, falling back to title for
    /// records that never resolved one. Returns the number removed.
    pub fn purge_source(&mut self, path: &Path, title: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| match &r.path {
            Some(p) => p != path,
            None => r.title != title,
        });
        before - self.records.len()
    }
}

/// Load and normalize chunk records from either accepted on-disk shape.
pub fn load_records(path: &Path) -> Vec<ChunkRecord> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let value: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring malformed metadata store {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    let items = match value.as_array() {
        Some(items) => items,
        None => {
            warn!("Metadata store {} is not an array; treating as empty", path.display());
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    let mut legacy_docs = 0usize;
    for item in items {
        if let Some(record) = parse_flat(item) {
            records.push(record);
        } else if let Some(mut doc_records) = parse_legacy_document(item) {
            legacy_docs += 1;
            records.append(&mut doc_records);
        }
        // Anything else is dropped: tolerate, don't crash.
    }
    if legacy_docs > 0 {
        info!(
            "Normalized {} legacy per-document entries from {}",
            legacy_docs,
            path.display()
        );
    }
    records
}

/// Current flat shape: one object per chunk, `text` and `page` present.
fn parse_flat(item: &Value) -> Option<ChunkRecord> {
    let obj = item.as_object()?;
    let text = obj.get("text")?.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let page = obj.get("page")?.as_u64()? as u32;
    Some(ChunkRecord {
        title: obj
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        page: page.max(1),
        text: text.to_string(),
        path: obj
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from),
        url: obj
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Legacy per-document shape: textual pieces nested under a known key.
/// Pieces are assigned 1-based positions as page numbers.
fn parse_legacy_document(item: &Value) -> Option<Vec<ChunkRecord>> {
    let obj = item.as_object()?;
    let title = obj
        .get("title")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let path = obj.get("path").and_then(Value::as_str).map(PathBuf::from);
    let url = obj.get("url").and_then(Value::as_str).map(str::to_string);

    for key in LEGACY_TEXT_KEYS {
        let pieces = match obj.get(*key).and_then(Value::as_array) {
            Some(pieces) if !pieces.is_empty() => pieces,
            _ => continue,
        };
        let records: Vec<ChunkRecord> = pieces
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, text)| ChunkRecord {
                title: title.clone(),
                page: (i + 1) as u32,
                text: text.to_string(),
                path: path.clone(),
                url: url.clone(),
            })
            .collect();
        if !records.is_empty() {
            return Some(records);
        }
    }
    None
}
