//! Text Extraction Stage: PDF bytes to raw text through an ordered chain of
//! strategies (embedded text layer first, rasterize + OCR second).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::{OcrBackend, OcrError};
use super::tesseract::TesseractBackend;
use crate::models::{ExtractionMethod, ExtractionResult};

/// Handle command output, extracting stdout on success or returning appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractionError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix,
                    stderr.trim()
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Check command status, returning appropriate error on failure.
fn check_cmd_status(
    result: std::io::Result<std::process::ExitStatus>,
    tool_name: &str,
    error_msg: &str,
) -> Result<(), ExtractionError> {
    match result {
        Ok(s) if s.success() => Ok(()),
        Ok(_) => Err(ExtractionError::ExtractionFailed(error_msg.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Errors that can occur inside a single extraction strategy.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text recovered by one strategy, one entry per page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTexts {
    pub pages: Vec<String>,
    /// Number of pages in the document, which may exceed `pages.len()`
    /// when some pages produced nothing.
    pub page_count: u32,
}

impl PageTexts {
    pub fn new(pages: Vec<String>) -> Self {
        let page_count = pages.len() as u32;
        Self { pages, page_count }
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    /// Non-empty pages joined with a blank line.
    pub fn joined(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// One way of getting text out of a PDF on disk.
pub trait TextStrategy: Send + Sync {
    /// Method recorded when this strategy produces the accepted text.
    fn method(&self) -> ExtractionMethod;

    fn attempt(&self, pdf_path: &Path) -> Result<PageTexts, ExtractionError>;
}

/// Embedded text layer via `pdftotext`.
#[derive(Debug, Default)]
pub struct NativeTextStrategy;

impl NativeTextStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl TextStrategy for NativeTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Native
    }

    fn attempt(&self, pdf_path: &Path) -> Result<PageTexts, ExtractionError> {
        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8"])
            .arg(pdf_path)
            .arg("-")
            .output();
        let text = handle_cmd_output(output, "pdftotext (install poppler-utils)", "pdftotext failed")?;

        let pages = split_pages(&text);
        let page_count = pdf_page_count(pdf_path).unwrap_or(pages.len() as u32);
        Ok(PageTexts::new(pages).with_page_count(page_count))
    }
}

/// Split `pdftotext` output into pages on form feeds.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
    // pdftotext terminates every page with a form feed
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

/// Get the page count of a PDF via `pdfinfo`.
pub fn pdf_page_count(file_path: &Path) -> Option<u32> {
    let output = Command::new("pdfinfo").arg(file_path).output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

/// Rasterize every page with `pdftoppm` and OCR each image.
pub struct OcrStrategy {
    backend: Arc<dyn OcrBackend>,
    dpi: u32,
}

impl OcrStrategy {
    pub fn new(backend: Arc<dyn OcrBackend>, dpi: u32) -> Self {
        Self { backend, dpi }
    }

    fn rasterize(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string()])
            .arg(pdf_path)
            .arg(out_dir.join("page"))
            .status();

        check_cmd_status(
            status,
            "pdftoppm (install poppler-utils)",
            "pdftoppm failed to convert PDF",
        )?;

        // pdftoppm zero-pads page numbers to a common width, so name order is page order
        let mut images: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "png").unwrap_or(false))
            .collect();
        images.sort();

        if images.is_empty() {
            return Err(ExtractionError::ExtractionFailed(
                "No images generated from PDF".to_string(),
            ));
        }
        Ok(images)
    }

    /// OCR page images in order. A page that fails is skipped; all pages
    /// failing is an error.
    fn ocr_images(&self, images: &[PathBuf]) -> Result<PageTexts, ExtractionError> {
        let mut pages = Vec::with_capacity(images.len());
        let mut last_error = None;

        for (i, image_path) in images.iter().enumerate() {
            match self.backend.ocr_image(image_path) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    warn!("OCR failed for page {}: {}", i + 1, e);
                    last_error = Some(e);
                }
            }
        }

        if pages.is_empty() {
            if let Some(e) = last_error {
                return Err(ExtractionError::ExtractionFailed(format!(
                    "{} failed on all {} pages: {}",
                    self.backend.name(),
                    images.len(),
                    e
                )));
            }
        }

        Ok(PageTexts::new(pages).with_page_count(images.len() as u32))
    }
}

impl TextStrategy for OcrStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn attempt(&self, pdf_path: &Path) -> Result<PageTexts, ExtractionError> {
        let temp_dir = TempDir::new()?;
        let images = self.rasterize(pdf_path, temp_dir.path())?;
        debug!(
            "Rasterized {} pages at {} DPI for {}",
            images.len(),
            self.dpi,
            self.backend.name()
        );
        self.ocr_images(&images)
    }
}

/// Runs text strategies in order until one yields non-empty text.
///
/// Never fails: when every strategy comes up empty or errors, the result
/// has `success = false`. The last strategy's outcome decides the recorded
/// method (`ocr_failed` when it ran but found nothing, `ocr_error` when it
/// raised).
pub struct TextExtractor {
    strategies: Vec<Box<dyn TextStrategy>>,
}

impl TextExtractor {
    pub fn new(strategies: Vec<Box<dyn TextStrategy>>) -> Self {
        Self { strategies }
    }

    /// Native text layer first, then Tesseract OCR.
    pub fn standard(ocr_language: &str, dpi: u32) -> Self {
        let backend: Arc<dyn OcrBackend> = Arc::new(TesseractBackend::new(ocr_language));
        Self::new(vec![
            Box::new(NativeTextStrategy::new()),
            Box::new(OcrStrategy::new(backend, dpi)),
        ])
    }

    /// Extract text from PDF bytes.
    pub fn extract(&self, pdf_bytes: &[u8]) -> ExtractionResult {
        match write_temp_pdf(pdf_bytes) {
            Ok(file) => self.extract_file(file.path()),
            Err(e) => {
                warn!("Could not stage PDF for extraction: {}", e);
                ExtractionResult::failed(ExtractionMethod::OcrError, 0, e.to_string())
            }
        }
    }

    /// Extract text from PDF bytes on the blocking thread pool.
    pub async fn extract_bytes(self: &Arc<Self>, pdf_bytes: Vec<u8>) -> ExtractionResult {
        let extractor = Arc::clone(self);
        match tokio::task::spawn_blocking(move || extractor.extract(&pdf_bytes)).await {
            Ok(result) => result,
            Err(e) => ExtractionResult::failed(
                ExtractionMethod::OcrError,
                0,
                format!("Extraction task failed: {}", e),
            ),
        }
    }

    /// Extract text from a PDF on disk.
    pub fn extract_file(&self, pdf_path: &Path) -> ExtractionResult {
        let mut page_count = 0;
        let mut last_error: Option<String> = None;

        for strategy in &self.strategies {
            let method = strategy.method();
            match strategy.attempt(pdf_path) {
                Ok(pages) => {
                    page_count = page_count.max(pages.page_count);
                    let text = pages.joined();
                    if !text.is_empty() {
                        info!(
                            "Extracted {} chars from {} pages ({})",
                            text.len(),
                            page_count,
                            method
                        );
                        return ExtractionResult::succeeded(text, page_count, method);
                    }
                    debug!("{} extraction produced no text, trying next strategy", method);
                    last_error = None;
                }
                Err(e) => {
                    warn!("{} extraction failed: {}", method, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        match last_error {
            Some(error) => ExtractionResult::failed(ExtractionMethod::OcrError, page_count, error),
            None => ExtractionResult::failed(
                ExtractionMethod::OcrFailed,
                page_count,
                "No text could be extracted from the document",
            ),
        }
    }
}

fn write_temp_pdf(bytes: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("claim-")
        .suffix(".pdf")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubStrategy {
        method: ExtractionMethod,
        outcome: Result<Vec<&'static str>, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl StubStrategy {
        fn boxed(
            method: ExtractionMethod,
            outcome: Result<Vec<&'static str>, &'static str>,
        ) -> (Box<dyn TextStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                method,
                outcome,
                calls: Arc::clone(&calls),
            };
            (Box::new(strategy), calls)
        }
    }

    impl TextStrategy for StubStrategy {
        fn method(&self) -> ExtractionMethod {
            self.method
        }

        fn attempt(&self, pdf_path: &Path) -> Result<PageTexts, ExtractionError> {
            assert!(pdf_path.exists());
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(pages) => Ok(PageTexts::new(pages.iter().map(|p| p.to_string()).collect())),
                Err(msg) => Err(ExtractionError::ExtractionFailed(msg.to_string())),
            }
        }
    }

    struct StubOcr {
        pages: Vec<Result<&'static str, &'static str>>,
        next: AtomicUsize,
    }

    impl OcrBackend for StubOcr {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn ocr_image(&self, _image_path: &Path) -> Result<String, OcrError> {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            match self.pages[i] {
                Ok(text) => Ok(text.to_string()),
                Err(msg) => Err(OcrError::OcrFailed(msg.to_string())),
            }
        }
    }

    #[test]
    fn native_text_short_circuits_ocr() {
        let (native, _) = StubStrategy::boxed(ExtractionMethod::Native, Ok(vec!["Page one", "", "Page three"]));
        let (ocr, ocr_calls) = StubStrategy::boxed(ExtractionMethod::Ocr, Ok(vec!["ocr"]));
        let extractor = TextExtractor::new(vec![native, ocr]);

        let result = extractor.extract(b"%PDF-1.4 stub");
        assert!(result.success);
        assert_eq!(result.extraction_method, ExtractionMethod::Native);
        assert_eq!(result.raw_text, "Page one\n\nPage three");
        assert_eq!(result.page_count, 3);
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn whitespace_native_text_falls_back_to_ocr() {
        let (native, _) = StubStrategy::boxed(ExtractionMethod::Native, Ok(vec!["  \n", "\t"]));
        let (ocr, ocr_calls) = StubStrategy::boxed(ExtractionMethod::Ocr, Ok(vec!["Scanned bill"]));
        let extractor = TextExtractor::new(vec![native, ocr]);

        let result = extractor.extract(b"%PDF-1.4 stub");
        assert!(result.success);
        assert_eq!(result.extraction_method, ExtractionMethod::Ocr);
        assert_eq!(result.raw_text, "Scanned bill");
        assert_eq!(result.page_count, 2);
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_ocr_is_ocr_failed() {
        let (native, _) = StubStrategy::boxed(ExtractionMethod::Native, Err("no text layer"));
        let (ocr, _) = StubStrategy::boxed(ExtractionMethod::Ocr, Ok(vec!["", " "]));
        let result = TextExtractor::new(vec![native, ocr]).extract(b"%PDF");

        assert!(!result.success);
        assert_eq!(result.extraction_method, ExtractionMethod::OcrFailed);
        assert_eq!(result.page_count, 2);
        assert!(result.error.is_some());
        assert!(result.raw_text.is_empty());
    }

    #[test]
    fn raising_ocr_is_ocr_error() {
        let (native, _) = StubStrategy::boxed(ExtractionMethod::Native, Ok(vec![""]));
        let (ocr, _) = StubStrategy::boxed(ExtractionMethod::Ocr, Err("tesseract exploded"));
        let result = TextExtractor::new(vec![native, ocr]).extract(b"%PDF");

        assert!(!result.success);
        assert_eq!(result.extraction_method, ExtractionMethod::OcrError);
        assert_eq!(result.page_count, 1);
        assert!(result.error.unwrap().contains("tesseract exploded"));
    }

    #[test]
    fn ocr_skips_failed_pages() {
        let strategy = OcrStrategy::new(
            Arc::new(StubOcr {
                pages: vec![Ok("first"), Err("smudged"), Ok("third")],
                next: AtomicUsize::new(0),
            }),
            300,
        );
        let images: Vec<PathBuf> = (1..=3).map(|i| PathBuf::from(format!("page-{i}.png"))).collect();

        let pages = strategy.ocr_images(&images).unwrap();
        assert_eq!(pages.page_count, 3);
        assert_eq!(pages.joined(), "first\n\nthird");
    }

    #[test]
    fn ocr_all_pages_failing_is_an_error() {
        let strategy = OcrStrategy::new(
            Arc::new(StubOcr {
                pages: vec![Err("a"), Err("b")],
                next: AtomicUsize::new(0),
            }),
            300,
        );
        let images = vec![PathBuf::from("page-1.png"), PathBuf::from("page-2.png")];
        let err = strategy.ocr_images(&images).unwrap_err();
        assert!(err.to_string().contains("all 2 pages"));
    }

    #[test]
    fn form_feeds_split_pages() {
        assert_eq!(split_pages("one\x0ctwo\x0c"), vec!["one", "two"]);
        assert_eq!(split_pages(""), vec![""]);
        assert_eq!(split_pages("single"), vec!["single"]);
    }

    #[tokio::test]
    async fn extract_bytes_runs_off_the_runtime() {
        let (native, calls) = StubStrategy::boxed(ExtractionMethod::Native, Ok(vec!["text"]));
        let extractor = Arc::new(TextExtractor::new(vec![native]));
        let result = extractor.extract_bytes(b"%PDF-1.7".to_vec()).await;
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
