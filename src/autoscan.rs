//! Autoscan: a cheap startup check that triggers background indexing.
//!
//! The quick listing is bounded in both file count and wall-clock time so
//! application startup never stalls on a huge or slow filesystem. It
//! compares against the same fingerprint registry the manual scanner
//! writes; the full (unbounded) scan inside the background indexing pass
//! then refreshes that registry for everything the quick listing missed.
//!
//! Indexing exclusivity is drop-not-queue: when an indexing pass already
//! holds the lock, the triggered run is abandoned rather than queued. The
//! next autoscan will notice anything still outstanding.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::engine::Engine;
use crate::index;
use crate::store::{fingerprint_file, FingerprintRegistry};

/// Quick-diff the roots against the fingerprint registry and, when
/// something is new or changed, notify the user and kick off incremental
/// indexing in the background. Returns the background task's handle when
/// one was spawned.
pub async fn check_and_maybe_scan(engine: &Arc<Engine>) -> Option<JoinHandle<()>> {
    let config = engine.config();
    let listing = quick_listing(config);
    let registry = FingerprintRegistry::load(&config.storage.data_dir);

    let mut changed: Vec<String> = Vec::new();
    for path in &listing {
        let fingerprint = match fingerprint_file(path) {
            Some(fp) => fp,
            None => continue,
        };
        if !registry.is_unchanged(path, fingerprint) {
            changed.push(
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
        }
    }

    if changed.is_empty() {
        debug!("Autoscan: nothing new among {} listed files", listing.len());
        return None;
    }

    info!("Autoscan found {} new or changed documents: {:?}", changed.len(), changed);
    engine.caps.notifier.notify(&format!(
        "{} new or updated documents found, indexing in the background",
        changed.len()
    ));

    let engine = Arc::clone(engine);
    Some(tokio::spawn(async move {
        // Drop the run when an indexing pass is already underway.
        let guard = match engine.index_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Autoscan: indexing already in progress, dropping run");
                return;
            }
        };
        if let Err(e) = index::ensure_up_to_date(engine.config(), &engine.caps).await {
            warn!("Background indexing failed: {}", e);
        }
        drop(guard);
    }))
}

/// List candidate PDFs under the roots, capped in count and elapsed time.
/// Applies the same exclusion policy as the scanner (size ceiling, exclude
/// globs, likely-empty floor): a file the indexer would never touch gets no
/// fingerprint, so listing it here would re-trigger indexing on every check.
fn quick_listing(config: &crate::config::Config) -> Vec<PathBuf> {
    let cap = config.autoscan.quick_file_cap;
    let budget = Duration::from_millis(config.autoscan.quick_budget_ms);
    let min_bytes = config.autoscan.min_file_bytes;
    let max_bytes = config.scan.max_size_kb * 1024;
    let exclude_set = match crate::scan::build_globset(&config.scan.exclude_globs) {
        Ok(set) => set,
        Err(e) => {
            warn!("Ignoring exclude globs in autoscan: {}", e);
            globset::GlobSet::empty()
        }
    };
    let started = Instant::now();

    let mut listing = Vec::new();
    'roots: for spec in &config.scan.roots {
        let root = spec.path();
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if listing.len() >= cap || started.elapsed() > budget {
                debug!("Autoscan listing truncated at {} files", listing.len());
                break 'roots;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if !is_pdf {
                continue;
            }
            if exclude_set.is_match(path) {
                continue;
            }
            let len = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };
            if len < min_bytes || len > max_bytes {
                continue;
            }
            listing.push(
                path.canonicalize()
                    .unwrap_or_else(|_| path.to_path_buf()),
            );
        }
    }
    listing
}
