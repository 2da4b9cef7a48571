//! Indexing pipeline: full rebuilds and incremental updates.
//!
//! A full build re-extracts every candidate and replaces both stores. An
//! incremental update re-extracts only the files the scan reported as
//! changed, purging each file's previous chunks before re-inserting the
//! fresh extraction. Purging disturbs the row↔record alignment of the
//! vector index, so any purge forces a full re-embed; a pure append keeps
//! the existing rows and only embeds the new chunks.

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::capability::Capabilities;
use crate::config::Config;
use crate::extract::extract_chunks;
use crate::metadata::MetadataStore;
use crate::models::ChunkRecord;
use crate::scan;
use crate::store::MappingStore;
use crate::vector::VectorIndex;

/// What an indexing run did, for logging and the CLI.
#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub files: usize,
    pub chunks_added: usize,
    pub chunks_removed: usize,
}

/// Re-extract every candidate, in discovery order, and replace the
/// metadata store wholesale.
pub async fn build_full(config: &Config, caps: &Capabilities) -> Result<IndexOutcome> {
    let data_dir = &config.storage.data_dir;
    let (_scanned, candidates) = scan::run_scan_with_candidates(&config.scan, data_dir)?;

    let mapping = MappingStore::load(data_dir);
    let mut records = Vec::new();
    let mut files = 0usize;
    for candidate in &candidates {
        let chunks = extract_chunks(caps, &mapping, config, &candidate.path, &candidate.basename);
        if chunks.is_empty() {
            warn!("No content extracted from {}", candidate.basename);
        } else {
            files += 1;
        }
        records.extend(chunks);
    }

    let mut store = MetadataStore::load(data_dir);
    let removed = store.records.len();
    let added = records.len();
    store.replace_all(records);
    store.save()?;

    rebuild_vectors(config, caps, &store).await;

    info!(
        "Full index built: {} files, {} chunks",
        files,
        store.records.len()
    );
    Ok(IndexOutcome {
        files,
        chunks_added: added,
        chunks_removed: removed,
    })
}

/// Bring the index up to date with the filesystem: delegate to a full build
/// when a required store is missing, otherwise re-index only changed files.
pub async fn ensure_up_to_date(config: &Config, caps: &Capabilities) -> Result<IndexOutcome> {
    let data_dir = &config.storage.data_dir;

    let metadata_missing = !MetadataStore::exists(data_dir);
    let vectors_missing = caps.embedder.is_enabled() && !VectorIndex::exists(data_dir);
    if metadata_missing || vectors_missing {
        info!("Required index artifacts missing; building from scratch");
        return build_full(config, caps).await;
    }

    let scanned = scan::run_scan(&config.scan, data_dir)?;
    if scanned.changed.is_empty() {
        info!("Index is up to date");
        return Ok(IndexOutcome::default());
    }

    let mapping = MappingStore::load(data_dir);
    let mut store = MetadataStore::load(data_dir);

    let mut removed_total = 0usize;
    let mut fresh: Vec<ChunkRecord> = Vec::new();
    let mut files = 0usize;
    for path in &scanned.changed {
        let name = basename(path);
        removed_total += store.purge_source(path, &name);
        let chunks = extract_chunks(caps, &mapping, config, path, &name);
        if chunks.is_empty() {
            warn!("No content extracted from {}", name);
        } else {
            files += 1;
        }
        fresh.extend(chunks);
    }

    let added = fresh.len();
    store.append(fresh.clone());
    store.save()?;

    if removed_total > 0 {
        // Purged rows shifted every later record; the whole index must be
        // re-embedded to restore alignment.
        rebuild_vectors(config, caps, &store).await;
    } else {
        append_vectors(config, caps, &fresh).await;
    }

    info!(
        "Incremental index: {} files re-indexed, {} chunks added, {} removed",
        files, added, removed_total
    );
    Ok(IndexOutcome {
        files,
        chunks_added: added,
        chunks_removed: removed_total,
    })
}

/// Embed every record and replace the vector artifact. Failures degrade to
/// an empty index so a stale artifact never misaligns with the metadata;
/// retrieval falls back to the lexical path until the next successful build.
async fn rebuild_vectors(config: &Config, caps: &Capabilities, store: &MetadataStore) {
    if !caps.embedder.is_enabled() {
        return;
    }
    let data_dir = &config.storage.data_dir;
    let mut index = VectorIndex::empty(data_dir, caps.embedder.dims());

    let texts: Vec<String> = store.records.iter().map(|r| r.text.clone()).collect();
    if !texts.is_empty() {
        match caps.embedder.embed(&texts).await {
            Ok(rows) => {
                if let Err(e) = index.rebuild(rows) {
                    warn!("Discarding embeddings: {}", e);
                }
            }
            Err(e) => warn!("Embedding failed; vector index left empty: {}", e),
        }
    }
    if let Err(e) = index.save() {
        warn!("Could not write vector index: {}", e);
    }
}

/// Embed only the appended records and extend the existing artifact. On
/// failure the rows stay a prefix of the metadata, which keeps row `i` ↔
/// record `i` valid for everything already embedded.
async fn append_vectors(config: &Config, caps: &Capabilities, fresh: &[ChunkRecord]) {
    if !caps.embedder.is_enabled() || fresh.is_empty() {
        return;
    }
    let data_dir = &config.storage.data_dir;
    let mut index = VectorIndex::load(data_dir, caps.embedder.dims());

    let texts: Vec<String> = fresh.iter().map(|r| r.text.clone()).collect();
    match caps.embedder.embed(&texts).await {
        Ok(rows) => {
            if let Err(e) = index.append(rows) {
                warn!("Discarding appended embeddings: {}", e);
                return;
            }
            if let Err(e) = index.save() {
                warn!("Could not write vector index: {}", e);
            }
        }
        Err(e) => warn!("Embedding failed for new chunks: {}", e),
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
