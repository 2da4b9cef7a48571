//! Index statistics for the `stats` command.

use std::collections::HashSet;
use std::path::Path;

use crate::metadata::{MetadataStore, CHUNKS_FILE};
use crate::store::{FingerprintRegistry, MappingStore, DIAGNOSTICS_FILE, FINGERPRINTS_FILE, MAPPINGS_FILE};
use crate::vector::{self, VECTORS_FILE};

#[derive(Debug)]
pub struct Stats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_rows: usize,
    pub mapped_documents: usize,
    pub fingerprints: usize,
    /// (file name, size in bytes) for each store file present on disk.
    pub store_files: Vec<(String, u64)>,
}

pub fn gather(data_dir: &Path) -> Stats {
    let store = MetadataStore::load(data_dir);
    let documents: HashSet<&str> = store.records.iter().map(|r| r.title.as_str()).collect();

    let mut store_files = Vec::new();
    for name in [CHUNKS_FILE, MAPPINGS_FILE, FINGERPRINTS_FILE, DIAGNOSTICS_FILE, VECTORS_FILE] {
        if let Ok(meta) = std::fs::metadata(data_dir.join(name)) {
            store_files.push((name.to_string(), meta.len()));
        }
    }

    Stats {
        documents: documents.len(),
        chunks: store.records.len(),
        embedded_rows: vector::stored_row_count(data_dir),
        mapped_documents: MappingStore::load(data_dir).len(),
        fingerprints: FingerprintRegistry::load(data_dir).len(),
        store_files,
    }
}

pub fn render(stats: &Stats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Documents:      {}\n", stats.documents));
    out.push_str(&format!("Chunks:         {}\n", stats.chunks));
    out.push_str(&format!("Embedded rows:  {}\n", stats.embedded_rows));
    out.push_str(&format!("Mapped files:   {}\n", stats.mapped_documents));
    out.push_str(&format!("Fingerprints:   {}\n", stats.fingerprints));
    if !stats.store_files.is_empty() {
        out.push_str("Store files:\n");
        for (name, size) in &stats.store_files {
            out.push_str(&format!("  {:<18} {}\n", name, format_bytes(*size)));
        }
    }
    out
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
