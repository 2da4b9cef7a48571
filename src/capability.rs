//! Optional capability objects: PDF text extraction, OCR, and user notices.
//!
//! Every external capability follows the null-object pattern: when the real
//! implementation is unavailable a no-op stands in, so call sites invoke
//! uniformly instead of branching on availability flags. The no-ops produce
//! the degraded behavior directly — no pages, empty OCR text, log-only
//! notices.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{Config, OcrConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::{self, ChatModel};

/// Extracts per-page native text from a PDF.
pub trait PdfText: Send + Sync {
    /// One string per page, in page order. An empty vector means the
    /// capability is absent or the file yielded nothing.
    fn page_texts(&self, path: &Path) -> Result<Vec<String>>;
}

/// Null object: no extraction capability, every file has zero pages.
pub struct NoPdfText;

impl PdfText for NoPdfText {
    fn page_texts(&self, _path: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// PDF text extraction backed by the `pdf-extract` crate.
pub struct PdfExtractText;

impl PdfText for PdfExtractText {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>> {
        pdf_extract::extract_text_by_pages(path)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed for {}: {}", path.display(), e))
    }
}

/// Recognizes text on a rendered PDF page.
pub trait Ocr: Send + Sync {
    /// OCR a single 1-based page. Empty output means "nothing usable".
    fn page_text(&self, pdf: &Path, page: u32) -> Result<String>;
}

/// Null object: OCR unavailable, every page reads as empty.
pub struct NoOcr;

impl Ocr for NoOcr {
    fn page_text(&self, _pdf: &Path, _page: u32) -> Result<String> {
        Ok(String::new())
    }
}

/// OCR via the `pdftoppm` and `tesseract` binaries: render the page to a
/// raster image at the configured DPI, then recognize it.
pub struct PopplerTesseractOcr {
    dpi: u32,
}

impl PopplerTesseractOcr {
    /// Probe for both binaries; `None` when either is missing.
    pub fn probe(config: &OcrConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let have_pdftoppm = Command::new("pdftoppm").arg("-v").output().is_ok();
        let have_tesseract = Command::new("tesseract").arg("--version").output().is_ok();
        if have_pdftoppm && have_tesseract {
            Some(Self { dpi: config.dpi })
        } else {
            debug!(
                "OCR unavailable (pdftoppm: {}, tesseract: {})",
                have_pdftoppm, have_tesseract
            );
            None
        }
    }
}

impl Ocr for PopplerTesseractOcr {
    fn page_text(&self, pdf: &Path, page: u32) -> Result<String> {
        let prefix = std::env::temp_dir().join(format!(
            "pdx_ocr_{}_{}",
            std::process::id(),
            page
        ));

        let render = Command::new("pdftoppm")
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .context("Failed to run pdftoppm")?;
        if !render.status.success() {
            anyhow::bail!(
                "pdftoppm failed for page {}: {}",
                page,
                String::from_utf8_lossy(&render.stderr)
            );
        }

        let image = prefix.with_extension("png");
        let recognized = Command::new("tesseract")
            .arg(&image)
            .arg("stdout")
            .output()
            .context("Failed to run tesseract");
        let _ = std::fs::remove_file(&image);

        let output = recognized?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract failed for page {}: {}",
                page,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Non-blocking user-facing notice ("toast"). The engine never waits on it.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Null object: notices go to the log only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("{}", message);
    }
}

/// The full capability set injected into the engine. Each member may be a
/// null object; the pipeline behaves identically either way, just degraded.
pub struct Capabilities {
    pub pdf: Box<dyn PdfText>,
    pub ocr: Box<dyn Ocr>,
    pub notifier: Box<dyn Notifier>,
    pub embedder: Box<dyn EmbeddingProvider>,
    pub chat: Box<dyn ChatModel>,
}

impl Capabilities {
    /// Detect what is actually available for this process.
    pub fn detect(config: &Config) -> Self {
        let ocr: Box<dyn Ocr> = match PopplerTesseractOcr::probe(&config.ocr) {
            Some(ocr) => Box::new(ocr),
            None => Box::new(NoOcr),
        };
        let embedder = match embedding::create_provider(&config.embedding) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Embedding provider unavailable: {}", e);
                Box::new(embedding::DisabledEmbedder)
            }
        };
        let chat = match llm::create_chat(&config.llm) {
            Ok(chat) => chat,
            Err(e) => {
                warn!("LLM provider unavailable: {}", e);
                Box::new(llm::DisabledChat)
            }
        };
        Self {
            pdf: Box::new(PdfExtractText),
            ocr,
            notifier: Box::new(LogNotifier),
            embedder,
            chat,
        }
    }

    /// A fully degraded set: no PDF text, no OCR, no embeddings, no LLM.
    pub fn none() -> Self {
        Self {
            pdf: Box::new(NoPdfText),
            ocr: Box::new(NoOcr),
            notifier: Box::new(LogNotifier),
            embedder: Box::new(embedding::DisabledEmbedder),
            chat: Box::new(llm::DisabledChat),
        }
    }
}
