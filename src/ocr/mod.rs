//! Text extraction from claim PDFs using pdftotext and Tesseract.

mod backend;
mod extractor;
mod tesseract;

pub use backend::{OcrBackend, OcrError};
pub use extractor::{
    pdf_page_count, split_pages, ExtractionError, NativeTextStrategy, OcrStrategy, PageTexts,
    TextExtractor, TextStrategy,
};
pub use tesseract::TesseractBackend;

/// External tools the extraction chain shells out to, with install hints.
pub const REQUIRED_TOOLS: [(&str, &str); 4] = [
    ("pdftotext", "poppler-utils"),
    ("pdfinfo", "poppler-utils"),
    ("pdftoppm", "poppler-utils"),
    ("tesseract", "tesseract-ocr"),
];

/// Whether `name` resolves to an executable on PATH.
pub fn tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Check if required tools are available.
pub fn check_tools() -> Vec<(String, bool)> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, _)| (tool.to_string(), tool_available(tool)))
        .collect()
}
