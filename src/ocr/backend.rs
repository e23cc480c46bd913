//! OCR backend abstraction.

use std::path::Path;

use thiserror::Error;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for engines that turn a page image into text.
///
/// Implementations are synchronous; callers run them on the blocking pool.
pub trait OcrBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Check if this backend is available (dependencies installed).
    fn is_available(&self) -> bool;

    /// Run OCR on an image file.
    fn ocr_image(&self, image_path: &Path) -> Result<String, OcrError>;
}
