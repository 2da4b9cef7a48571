//! Root scanner: walks configured directories, applies the size ceiling,
//! and partitions surviving PDF candidates into changed vs. unchanged by
//! comparing fingerprints against the registry.
//!
//! The scan never fails because of one bad file: candidates that cannot be
//! stat'ed are silently dropped, and size-policy exclusions are logged as
//! deliberate skips.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{RootSpec, ScanConfig};
use crate::models::{Fingerprint, ScanOutcome};
use crate::store::{fingerprint_file, FingerprintRegistry, MappingStore};

/// A surviving scan candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub basename: String,
    pub fingerprint: Fingerprint,
}

/// Run a full scan: collect candidates, refresh the mapping store and the
/// fingerprint registry, and report which files changed since last time.
pub fn run_scan(scan: &ScanConfig, data_dir: &Path) -> Result<ScanOutcome> {
    Ok(run_scan_with_candidates(scan, data_dir)?.0)
}

/// Like [`run_scan`], but also returns the surviving candidates in
/// discovery order, for callers that process every file regardless of the
/// changed/unchanged partition.
pub fn run_scan_with_candidates(
    scan: &ScanConfig,
    data_dir: &Path,
) -> Result<(ScanOutcome, Vec<Candidate>)> {
    let candidates = collect_candidates(scan)?;

    let mut mapping = MappingStore::load(data_dir);
    let mut registry = FingerprintRegistry::load(data_dir);

    let mut outcome = ScanOutcome::default();
    for candidate in &candidates {
        mapping.set_path(&candidate.basename, &candidate.path);
        if registry.is_unchanged(&candidate.path, candidate.fingerprint) {
            outcome.unchanged.push(candidate.path.clone());
        } else {
            registry.update(&candidate.path, candidate.fingerprint);
            outcome.changed.push(candidate.path.clone());
        }
    }

    mapping.save()?;
    registry.save()?;

    info!(
        "Scan complete: {} changed, {} unchanged",
        outcome.changed.len(),
        outcome.unchanged.len()
    );
    Ok((outcome, candidates))
}

/// Collect candidate PDFs from the roots (recursive) and the extra folder
/// (top level only), in root priority order. On basename collision the
/// first discovery wins.
pub fn collect_candidates(scan: &ScanConfig) -> Result<Vec<Candidate>> {
    let roots = normalize_roots(&scan.roots);
    let exclude_set = build_globset(&scan.exclude_globs)?;
    let max_bytes = scan.max_size_kb * 1024;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for root in &roots {
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            consider(
                entry.path(),
                max_bytes,
                &exclude_set,
                &mut seen,
                &mut candidates,
            );
        }
    }

    if let Some(extra) = &scan.extra_folder {
        match std::fs::read_dir(extra) {
            Ok(entries) => {
                let mut paths: Vec<PathBuf> =
                    entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
                paths.sort();
                for path in paths {
                    if path.is_file() {
                        consider(&path, max_bytes, &exclude_set, &mut seen, &mut candidates);
                    }
                }
            }
            Err(e) => warn!("Cannot read extra folder {}: {}", extra.display(), e),
        }
    }

    Ok(candidates)
}

fn consider(
    path: &Path,
    max_bytes: u64,
    exclude_set: &GlobSet,
    seen: &mut std::collections::HashSet<String>,
    candidates: &mut Vec<Candidate>,
) {
    if !is_pdf(path) {
        return;
    }
    if exclude_set.is_match(path) {
        debug!("Excluded by glob: {}", path.display());
        return;
    }
    let basename = match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return,
    };
    if seen.contains(&basename) {
        debug!("Basename collision, keeping first: {}", basename);
        return;
    }
    // Stat failures silently drop the candidate; one bad file never fails
    // the scan.
    let fingerprint = match fingerprint_file(path) {
        Some(fp) => fp,
        None => return,
    };
    if fingerprint.size > max_bytes {
        info!(
            "Skipping {} ({} KB over the {} KB ceiling)",
            path.display(),
            fingerprint.size / 1024,
            max_bytes / 1024
        );
        return;
    }
    seen.insert(basename.clone());
    candidates.push(Candidate {
        path: absolutize(path),
        basename,
        fingerprint,
    });
}

/// Normalize heterogeneous root descriptors into a deduplicated ordered
/// list of directories. Unusable entries are dropped rather than erroring.
fn normalize_roots(roots: &[RootSpec]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for spec in roots {
        let path = spec.path();
        if path.as_os_str().is_empty() || !path.is_dir() {
            warn!("Dropping unusable scan root: {}", path.display());
            continue;
        }
        let abs = absolutize(path);
        if seen.insert(abs.clone()) {
            out.push(abs);
        }
    }
    out
}

fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;

    fn scan_config(roots: Vec<PathBuf>) -> ScanConfig {
        ScanConfig {
            roots: roots.into_iter().map(RootSpec::Plain).collect(),
            extra_folder: None,
            max_size_kb: 80_000,
            exclude_globs: Vec::new(),
        }
    }

    #[test]
    fn collects_pdfs_case_insensitively() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(tmp.path().join("b.PDF"), b"x").unwrap();
        std::fs::write(tmp.path().join("c.txt"), b"x").unwrap();

        let candidates =
            collect_candidates(&scan_config(vec![tmp.path().to_path_buf()])).unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.basename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
    }

    #[test]
    fn size_ceiling_excludes_large_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("small.pdf"), vec![0u8; 512]).unwrap();
        std::fs::write(tmp.path().join("big.pdf"), vec![0u8; 4096]).unwrap();

        let mut config = scan_config(vec![tmp.path().to_path_buf()]);
        config.max_size_kb = 2; // 2048 bytes
        let candidates = collect_candidates(&config).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].basename, "small.pdf");
    }

    #[test]
    fn first_root_wins_on_basename_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(first.join("doc.pdf"), b"one").unwrap();
        std::fs::write(second.join("doc.pdf"), b"two").unwrap();

        let candidates = collect_candidates(&scan_config(vec![first.clone(), second])).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].path.starts_with(first.canonicalize().unwrap()));
    }

    #[test]
    fn extra_folder_is_top_level_only() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let extra = tmp.path().join("extra");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(extra.join("nested")).unwrap();
        std::fs::write(extra.join("top.pdf"), b"x").unwrap();
        std::fs::write(extra.join("nested").join("deep.pdf"), b"x").unwrap();

        let mut config = scan_config(vec![root]);
        config.extra_folder = Some(extra);
        let candidates = collect_candidates(&config).unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.basename.as_str()).collect();
        assert_eq!(names, vec!["top.pdf"]);
    }

    #[test]
    fn unusable_roots_are_dropped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"x").unwrap();
        let config = scan_config(vec![
            PathBuf::from("/does/not/exist"),
            tmp.path().to_path_buf(),
        ]);
        let candidates = collect_candidates(&config).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn scan_partitions_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.pdf"), b"content").unwrap();

        let config = scan_config(vec![docs.clone()]);
        let first = run_scan(&config, &data).unwrap();
        assert_eq!(first.changed.len(), 1);
        assert!(first.unchanged.is_empty());

        // Second scan over an unchanged tree: nothing changed.
        let second = run_scan(&config, &data).unwrap();
        assert!(second.changed.is_empty());
        assert_eq!(second.unchanged.len(), 1);
    }

    #[test]
    fn scan_registers_fingerprint_for_changed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("A.pdf"), vec![0u8; 10 * 1024]).unwrap();

        let config = scan_config(vec![docs.clone()]);
        let outcome = run_scan(&config, &data).unwrap();
        assert_eq!(outcome.changed.len(), 1);

        let registry = FingerprintRegistry::load(&data);
        let fp = registry.get(&outcome.changed[0]).unwrap();
        assert_eq!(fp.size, 10 * 1024);
        assert!(fp.mtime > 0);
    }
}
