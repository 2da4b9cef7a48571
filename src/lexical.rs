//! Lexical fallback index (BM25-lite).
//!
//! A self-contained inverted index over the metadata store, used whenever
//! the vector path is unavailable or empty. It is rebuilt lazily: only when
//! the store file's on-disk modification time has changed since the last
//! build, so repeated queries don't re-tokenize an unchanged corpus.
//!
//! Scoring is a presence-weighted IDF sum: each query term found in a chunk
//! contributes `ln(1 + N / (df + 1))`, term frequency within the chunk is
//! deliberately ignored. The smoothing keeps every IDF strictly positive
//! and caps the weight of very rare terms.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use crate::metadata;
use crate::models::{ChunkRecord, SearchHit};

#[derive(Debug, Default)]
pub struct LexicalIndex {
    built_mtime: Option<SystemTime>,
    records: Vec<ChunkRecord>,
    /// term → chunk indices containing it (each index at most once).
    postings: HashMap<String, Vec<u32>>,
}

impl LexicalIndex {
    /// Rebuild from the metadata store if its file changed since the last
    /// build. Accepts both on-disk shapes via the metadata loader.
    pub fn ensure_fresh(&mut self, data_dir: &Path) {
        let current = metadata::MetadataStore::mtime(data_dir);
        if current.is_some() && current == self.built_mtime {
            return;
        }

        let records = metadata::load_records(&metadata::MetadataStore::file_path(data_dir));
        let mut postings: HashMap<String, Vec<u32>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            let mut seen = std::collections::HashSet::new();
            for term in tokenize(&record.text) {
                if seen.insert(term.clone()) {
                    postings.entry(term).or_default().push(i as u32);
                }
            }
        }

        debug!(
            "Rebuilt lexical index: {} chunks, {} terms",
            records.len(),
            postings.len()
        );
        self.records = records;
        self.postings = postings;
        self.built_mtime = current;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// The normalized records, in store order. Vector index row `i` refers
    /// to `records()[i]`.
    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smoothed inverse document frequency; strictly positive.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.records.len() as f64;
        let df = self.postings.get(term).map_or(0, |p| p.len()) as f64;
        (1.0 + n / (df + 1.0)).ln()
    }

    /// Rank chunks by the IDF sum of the query terms they contain. Ties
    /// break on ascending chunk index for deterministic output.
    pub fn search(&self, query: &str, top_k: usize, min_score: f64) -> Vec<SearchHit> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<u32, f64> = HashMap::new();
        for term in &terms {
            if let Some(indices) = self.postings.get(term) {
                let idf = self.idf(term);
                for &i in indices {
                    *scores.entry(i).or_insert(0.0) += idf;
                }
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(i, score)| SearchHit::from_record(&self.records[i as usize], score))
            .collect()
    }
}

/// Runs of Unicode letters/digits, case-folded.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
