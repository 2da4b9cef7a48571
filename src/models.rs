//! Core data types shared across the indexing and retrieval pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One indexed chunk of page text. The metadata store is an ordered list of
/// these records and is the single source of truth for both the lexical and
/// the vector index (vector row `i` corresponds to record `i`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Display name of the source document.
    pub title: String,
    /// 1-based page number within the source document.
    pub page: u32,
    /// Whitespace-normalized, non-empty chunk text.
    pub text: String,
    /// Resolved local file, if the document exists on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Remote location, if one was supplied externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Size + mtime pair used for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
}

/// Where a document basename resolves to. An externally supplied `url`
/// survives path-only rescans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Result of a root scan: candidates partitioned by fingerprint equality.
/// "Changed" covers both new and modified files; callers never need to
/// distinguish the two.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub changed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

/// A ranked retrieval hit, produced by either the vector or the lexical path.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub page: u32,
    pub text: String,
    pub score: f64,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
}

impl SearchHit {
    pub fn from_record(record: &ChunkRecord, score: f64) -> Self {
        Self {
            title: record.title.clone(),
            page: record.page,
            text: record.text.clone(),
            score,
            path: record.path.clone(),
            url: record.url.clone(),
        }
    }
}

/// A citation attached to an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub score: f64,
    pub snippet: String,
}

impl SourceRef {
    pub fn from_hit(hit: &SearchHit) -> Self {
        let snippet: String = hit.text.chars().take(160).collect();
        Self {
            title: hit.title.clone(),
            page: hit.page,
            path: hit.path.clone(),
            url: hit.url.clone(),
            score: hit.score,
            snippet,
        }
    }
}

/// Best-effort answer returned by the query orchestrator.
#[derive(Debug, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}
