//! On-disk vector index.
//!
//! The artifact is an opaque binary blob owned by this module: a small
//! header (magic, version, dims, row count) followed by little-endian f32
//! rows. Row `i` corresponds to record `i` of the metadata store. Search is
//! brute-force cosine similarity — index sizes here are thousands of
//! chunks, not millions.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::warn;

pub const VECTORS_FILE: &str = "vectors.bin";

const MAGIC: &[u8; 4] = b"PDXV";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 4;

#[derive(Debug)]
pub struct VectorIndex {
    path: PathBuf,
    dims: usize,
    rows: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn file_path(data_dir: &Path) -> PathBuf {
        data_dir.join(VECTORS_FILE)
    }

    pub fn exists(data_dir: &Path) -> bool {
        Self::file_path(data_dir).exists()
    }

    /// An empty index ready to be (re)built.
    pub fn empty(data_dir: &Path, dims: usize) -> Self {
        Self {
            path: Self::file_path(data_dir),
            dims,
            rows: Vec::new(),
        }
    }

    /// Load the artifact. Missing or corrupt files load as an empty index
    /// with the expected dimensionality; retrieval then falls back to the
    /// lexical path until the next rebuild.
    pub fn load(data_dir: &Path, dims: usize) -> Self {
        let path = Self::file_path(data_dir);
        match read_artifact(&path) {
            Ok(Some((stored_dims, rows))) if stored_dims == dims => Self { path, dims, rows },
            Ok(Some((stored_dims, _))) => {
                warn!(
                    "Vector index {} has dims {} but config expects {}; ignoring it",
                    path.display(),
                    stored_dims,
                    dims
                );
                Self {
                    path,
                    dims,
                    rows: Vec::new(),
                }
            }
            Ok(None) => Self {
                path,
                dims,
                rows: Vec::new(),
            },
            Err(e) => {
                warn!("Ignoring unreadable vector index {}: {}", path.display(), e);
                Self {
                    path,
                    dims,
                    rows: Vec::new(),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace all rows (full rebuild).
    pub fn rebuild(&mut self, rows: Vec<Vec<f32>>) -> Result<()> {
        self.check_dims(&rows)?;
        self.rows = rows;
        Ok(())
    }

    /// Append rows after all existing ones (incremental build).
    pub fn append(&mut self, rows: Vec<Vec<f32>>) -> Result<()> {
        self.check_dims(&rows)?;
        self.rows.extend(rows);
        Ok(())
    }

    fn check_dims(&self, rows: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = rows.iter().find(|r| r.len() != self.dims) {
            bail!(
                "Embedding dimensionality mismatch: got {}, expected {}",
                bad.len(),
                self.dims
            );
        }
        Ok(())
    }

    /// Nearest neighbors by cosine similarity: (row index, similarity),
    /// best first. `k` is bounded by the current index size.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let k = k.min(self.rows.len());
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, cosine_similarity(query, row)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.rows.len() * self.dims * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.rows.len() as u32).to_le_bytes());
        for row in &self.rows {
            for &v in row {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Row count recorded in the artifact, 0 when missing or unreadable.
pub fn stored_row_count(data_dir: &Path) -> usize {
    match read_artifact(&VectorIndex::file_path(data_dir)) {
        Ok(Some((_, rows))) => rows.len(),
        _ => 0,
    }
}

fn read_artifact(path: &Path) -> Result<Option<(usize, Vec<Vec<f32>>)>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return Ok(None),
    };
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        bail!("bad header");
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VERSION {
        bail!("unsupported version {}", version);
    }
    let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let expected = HEADER_LEN + count * dims * 4;
    if dims == 0 || bytes.len() != expected {
        bail!("truncated payload ({} bytes, expected {})", bytes.len(), expected);
    }

    let mut rows = Vec::with_capacity(count);
    let mut offset = HEADER_LEN;
    for _ in 0..count {
        let row: Vec<f32> = bytes[offset..offset + dims * 4]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        rows.push(row);
        offset += dims * 4;
    }
    Ok(Some((dims, rows)))
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::empty(tmp.path(), 3);
        index
            .rebuild(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        index.save().unwrap();

        let reloaded = VectorIndex::load(tmp.path(), 3);
        assert_eq!(reloaded.len(), 2);
        let hits = reloaded.search(&[1.0, 0.0, 0.0], 1);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn append_preserves_prior_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::empty(tmp.path(), 2);
        index.rebuild(vec![vec![1.0, 0.0]]).unwrap();
        index.append(vec![vec![0.0, 1.0]]).unwrap();
        assert_eq!(index.len(), 2);
        let hits = index.search(&[0.0, 1.0], 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 0);
    }

    #[test]
    fn search_bounded_by_index_size() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::empty(tmp.path(), 2);
        index.rebuild(vec![vec![1.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn corrupt_artifact_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(VectorIndex::file_path(tmp.path()), b"junk").unwrap();
        let index = VectorIndex::load(tmp.path(), 3);
        assert!(index.is_empty());
    }

    #[test]
    fn dims_mismatch_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::empty(tmp.path(), 3);
        assert!(index.rebuild(vec![vec![1.0, 0.0]]).is_err());
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
