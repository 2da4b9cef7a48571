use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub scan: ScanConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub autoscan: AutoscanConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding chunks.json, mappings.json, fingerprints.json,
    /// diagnostics.json, and vectors.bin.
    pub data_dir: PathBuf,
    /// Canonical local folder probed when a basename has no mapping entry.
    #[serde(default)]
    pub library_dir: Option<PathBuf>,
}

/// A root directory descriptor. Configs may list plain path strings or
/// tables carrying a `path` field; both normalize to the same thing.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RootSpec {
    Plain(PathBuf),
    Detailed {
        path: PathBuf,
    },
}

impl RootSpec {
    pub fn path(&self) -> &Path {
        match self {
            RootSpec::Plain(p) => p,
            RootSpec::Detailed { path } => path,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Roots in priority order; on basename collision the first root wins.
    pub roots: Vec<RootSpec>,
    /// Optional folder whose top-level PDFs are added as extra candidates.
    #[serde(default)]
    pub extra_folder: Option<PathBuf>,
    /// Files larger than this are excluded from indexing.
    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_max_size_kb() -> u64 {
    80_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_words_per_chunk")]
    pub words_per_chunk: usize,
    #[serde(default = "default_stride_words")]
    pub stride_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            words_per_chunk: default_words_per_chunk(),
            stride_words: default_stride_words(),
        }
    }
}

fn default_words_per_chunk() -> usize {
    250
}
fn default_stride_words() -> usize {
    220
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f64,
    /// Character budget for the packed context string.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            context_budget_chars: default_context_budget(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_context_budget() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// Probe for pdftoppm + tesseract at startup. When false, or when the
    /// probe fails, pages keep whatever native text they have.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pages whose normalized native text is shorter than this get an OCR
    /// attempt; OCR output shorter than this is discarded as noise.
    #[serde(default = "default_ocr_min_chars")]
    pub min_chars: usize,
    /// Raster resolution for the OCR render pass (~2x zoom).
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: default_ocr_min_chars(),
            dpi: default_ocr_dpi(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ocr_min_chars() -> usize {
    30
}
fn default_ocr_dpi() -> u32 {
    288
}

#[derive(Debug, Deserialize, Clone)]
pub struct AutoscanConfig {
    /// Quick listing stops after this many files.
    #[serde(default = "default_quick_file_cap")]
    pub quick_file_cap: usize,
    /// Quick listing stops after this wall-clock budget.
    #[serde(default = "default_quick_budget_ms")]
    pub quick_budget_ms: u64,
    /// Files smaller than this are treated as likely-empty and skipped.
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
}

impl Default for AutoscanConfig {
    fn default() -> Self {
        Self {
            quick_file_cap: default_quick_file_cap(),
            quick_budget_ms: default_quick_budget_ms(),
            min_file_bytes: default_min_file_bytes(),
        }
    }
}

fn default_quick_file_cap() -> usize {
    1000
}
fn default_quick_budget_ms() -> u64 {
    2000
}
fn default_min_file_bytes() -> u64 {
    1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scan.roots.is_empty() {
        anyhow::bail!("scan.roots must list at least one directory");
    }
    if config.scan.max_size_kb == 0 {
        anyhow::bail!("scan.max_size_kb must be > 0");
    }

    if config.chunking.words_per_chunk == 0 {
        anyhow::bail!("chunking.words_per_chunk must be > 0");
    }
    if config.chunking.stride_words == 0
        || config.chunking.stride_words > config.chunking.words_per_chunk
    {
        anyhow::bail!("chunking.stride_words must be in 1..=words_per_chunk");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be disabled or openai.", other),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("pdx.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[storage]
data_dir = "./data"

[scan]
roots = ["/docs"]
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.scan.max_size_kb, 80_000);
        assert_eq!(cfg.chunking.words_per_chunk, 250);
        assert_eq!(cfg.chunking.stride_words, 220);
        assert_eq!(cfg.retrieval.context_budget_chars, 12_000);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.llm.is_enabled());
    }

    #[test]
    fn roots_accept_plain_and_detailed_forms() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[storage]
data_dir = "./data"

[scan]
roots = ["/a", { path = "/b" }]
"#,
        );
        let cfg = load_config(&path).unwrap();
        let paths: Vec<_> = cfg.scan.roots.iter().map(|r| r.path().to_path_buf()).collect();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[storage]
data_dir = "./data"

[scan]
roots = ["/docs"]

[embedding]
provider = "openai"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn stride_larger_than_window_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[storage]
data_dir = "./data"

[scan]
roots = ["/docs"]

[chunking]
words_per_chunk = 100
stride_words = 150
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
