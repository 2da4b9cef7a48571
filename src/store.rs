//! Whole-file JSON stores: the basename→location mapping, the unified
//! fingerprint registry, and the per-file extraction diagnostics log.
//!
//! Each store is loaded into memory at the start of an operation, mutated,
//! and written back as a whole-file replacement. A single process owns the
//! files; there are no record-level transactions. Unreadable or malformed
//! store files load as empty rather than erroring, so storage corruption
//! degrades to an empty index instead of a crash.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Fingerprint, MappingEntry};

pub const MAPPINGS_FILE: &str = "mappings.json";
pub const FINGERPRINTS_FILE: &str = "fingerprints.json";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";

/// Load a JSON store, falling back to the default value when the file is
/// missing or unparseable.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring malformed store {}: {}", path.display(), e);
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

/// Replace a JSON store on disk with the given value.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// ============ Mapping store ============

/// Maps a document basename to its resolved location. A basename is unique;
/// the first root in priority order wins at scan time.
#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    entries: BTreeMap<String, MappingEntry>,
}

impl MappingStore {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(MAPPINGS_FILE);
        let entries = load_json_or_default(&path);
        Self { path, entries }
    }

    pub fn reload(&mut self) {
        self.entries = load_json_or_default(&self.path);
    }

    pub fn save(&self) -> Result<()> {
        save_json(&self.path, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, basename: &str) -> Option<&MappingEntry> {
        self.entries.get(basename)
    }

    /// Record the on-disk location of a basename. A `url` set by an earlier
    /// data source is preserved; only `path` is refreshed.
    pub fn set_path(&mut self, basename: &str, path: &Path) {
        let entry = self.entries.entry(basename.to_string()).or_default();
        entry.path = Some(path.to_path_buf());
    }
}

// ============ Fingerprint registry ============

/// The single (size, mtime) baseline keyed by absolute path, shared by the
/// manual scanner and the autoscan manager so the two change-detection
/// paths cannot drift.
#[derive(Debug)]
pub struct FingerprintRegistry {
    path: PathBuf,
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintRegistry {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(FINGERPRINTS_FILE);
        let entries = load_json_or_default(&path);
        Self { path, entries }
    }

    pub fn save(&self) -> Result<()> {
        save_json(&self.path, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, abs_path: &Path) -> Option<Fingerprint> {
        self.entries.get(&key(abs_path)).copied()
    }

    /// True when the stored fingerprint matches exactly (size and mtime).
    pub fn is_unchanged(&self, abs_path: &Path, current: Fingerprint) -> bool {
        self.get(abs_path) == Some(current)
    }

    pub fn update(&mut self, abs_path: &Path, current: Fingerprint) {
        self.entries.insert(key(abs_path), current);
    }
}

fn key(abs_path: &Path) -> String {
    abs_path.to_string_lossy().to_string()
}

/// Stat a file into a fingerprint. `None` when the file cannot be stat'ed;
/// callers drop such candidates silently.
pub fn fingerprint_file(path: &Path) -> Option<Fingerprint> {
    let metadata = std::fs::metadata(path).ok()?;
    let mtime = metadata
        .modified()
        .ok()?
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Some(Fingerprint {
        size: metadata.len(),
        mtime,
    })
}

// ============ Extraction diagnostics ============

/// Lightweight per-file extraction record. Non-critical: failures to write
/// the log never abort extraction.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub title: String,
    pub pages: usize,
    pub chunks: usize,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

pub fn record_extraction(data_dir: &Path, title: &str, pages: usize, chunks: usize) {
    let path = data_dir.join(DIAGNOSTICS_FILE);
    let mut entries: Vec<DiagnosticEntry> = load_json_or_default(&path);
    entries.push(DiagnosticEntry {
        title: title.to_string(),
        pages,
        chunks,
        recorded_at: chrono::Utc::now(),
    });
    if let Err(e) = save_json(&path, &entries) {
        debug!("Could not record extraction diagnostics for {}: {}", title, e);
    }
}
