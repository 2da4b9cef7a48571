//! End-to-end tests driving the `pdx` binary against a temporary corpus of
//! minimal hand-built PDFs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pdx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pdx");
    path
}

/// Minimal valid PDF with one content stream per page. Body first, then an
/// xref with correct byte offsets so pdf-extract can parse it. Page texts
/// must avoid `(`, `)` and `\`.
fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let kids: String = (0..n)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects: Vec<Vec<u8>> = Vec::new();
    objects.push(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n".to_vec());
    objects.push(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids, n
        )
        .into_bytes(),
    );
    objects
        .push(b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n".to_vec());
    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let content_id = 5 + 2 * i;
        objects.push(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id, content_id
            )
            .into_bytes(),
        );
        let stream = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET\n", text);
        objects.push(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}endstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .into_bytes(),
        );
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for object in &objects {
        offsets.push(out.len());
        out.extend_from_slice(object);
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("alpha.pdf"),
        minimal_pdf(&["the alpha document explains rust ownership and borrowing semantics"]),
    )
    .unwrap();
    fs::write(
        docs_dir.join("beta.pdf"),
        minimal_pdf(&[
            "the beta document opens with an introduction to gradient descent methods",
            "its second page covers stochastic momentum and learning rate schedules",
        ]),
    )
    .unwrap();

    let config_content = format!(
        r#"[storage]
data_dir = "{}/data"

[scan]
roots = ["{}/docs"]

[ocr]
enabled = false

[autoscan]
min_file_bytes = 16
"#,
        root.display(),
        root.display()
    );
    let config_path = root.join("pdx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pdx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_scan_partitions_then_goes_quiet() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pdx(&config_path, &["scan"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 changed, 0 unchanged"));

    // Nothing touched since; the same scan reports everything unchanged.
    let (stdout, _, success) = run_pdx(&config_path, &["scan"]);
    assert!(success);
    assert!(stdout.contains("0 changed, 2 unchanged"));
}

#[test]
fn test_index_then_ask_cites_title_and_page() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pdx(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 2 files"));

    // No LLM configured: the answer is the matching extracts themselves,
    // with bracketed title/page citations and a sources list.
    let (stdout, _, success) = run_pdx(&config_path, &["ask", "rust ownership"]);
    assert!(success);
    assert!(stdout.contains("[alpha.pdf - p.1]"));
    assert!(stdout.contains("ownership and borrowing"));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("alpha.pdf p.1"));
}

#[test]
fn test_search_is_page_accurate() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, stderr, success) = run_pdx(&config_path, &["search", "momentum schedules"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("beta.pdf p.2"));
    assert!(!stdout.contains("beta.pdf p.1"));
}

#[test]
fn test_search_without_matches_says_so() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, _, success) = run_pdx(&config_path, &["search", "zymurgy"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_modified_file_reindexed_without_duplicates() {
    let (tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    // Rewrite alpha.pdf with different content (and size, so the
    // fingerprint differs even within the same second).
    fs::write(
        tmp.path().join("docs").join("alpha.pdf"),
        minimal_pdf(&["the alpha document was rewritten to discuss garbage collection instead"]),
    )
    .unwrap();

    let (stdout, stderr, success) = run_pdx(&config_path, &["index"]);
    assert!(success, "reindex failed: stderr={}", stderr);
    assert!(stdout.contains("Indexed 1 files"));

    let (stdout, _, _) = run_pdx(&config_path, &["search", "garbage collection"]);
    assert!(stdout.contains("alpha.pdf p.1"));
    let (stdout, _, _) = run_pdx(&config_path, &["search", "ownership borrowing"]);
    assert!(
        !stdout.contains("alpha.pdf"),
        "stale chunks survived the reindex: {}",
        stdout
    );
}

#[test]
fn test_empty_question_gets_guidance() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, _, success) = run_pdx(&config_path, &["ask", "   "]);
    assert!(success);
    assert!(stdout.contains("Please provide a question"));
}

#[test]
fn test_question_with_no_matches_reports_it() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, _, success) = run_pdx(&config_path, &["ask", "zymurgy"]);
    assert!(success);
    assert!(stdout.contains("No matching passages"));
    assert!(stdout.contains("re-running `pdx index`"));
}

#[test]
fn test_stream_emits_the_extracts() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, stderr, success) = run_pdx(&config_path, &["stream", "gradient descent"]);
    assert!(success, "stream failed: stderr={}", stderr);
    assert!(stdout.contains("[beta.pdf - p.1]"));
    assert!(stdout.contains("gradient descent"));
}

#[test]
fn test_autoscan_detects_new_document() {
    let (tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, _, success) = run_pdx(&config_path, &["autoscan"]);
    assert!(success);
    assert!(stdout.contains("up to date"));

    fs::write(
        tmp.path().join("docs").join("gamma.pdf"),
        minimal_pdf(&["the gamma document surveys distributed consensus protocols in depth"]),
    )
    .unwrap();

    let (stdout, stderr, success) = run_pdx(&config_path, &["autoscan"]);
    assert!(success, "autoscan failed: stderr={}", stderr);
    assert!(stdout.contains("Changes detected"));

    let (stdout, _, _) = run_pdx(&config_path, &["search", "consensus protocols"]);
    assert!(stdout.contains("gamma.pdf p.1"));
}

#[test]
fn test_stats_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, _, success) = run_pdx(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:      2"));
    assert!(stdout.contains("Chunks:         3"));
    assert!(stdout.contains("chunks.json"));
}

#[test]
fn test_open_unknown_document_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (_, stderr, success) = run_pdx(&config_path, &["open", "nonexistent.pdf"]);
    assert!(!success);
    assert!(stderr.contains("no known location"));
}

#[test]
fn test_index_full_rebuilds_everything() {
    let (_tmp, config_path) = setup_test_env();
    run_pdx(&config_path, &["index"]);

    let (stdout, stderr, success) = run_pdx(&config_path, &["index", "--full"]);
    assert!(success, "full rebuild failed: stderr={}", stderr);
    assert!(stdout.contains("Indexed 2 files"));

    let (stdout, _, _) = run_pdx(&config_path, &["stats"]);
    assert!(stdout.contains("Chunks:         3"));
}
