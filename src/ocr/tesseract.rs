//! Tesseract OCR backend via the command-line tool.

use std::path::Path;
use std::process::Command;

use super::backend::{OcrBackend, OcrError};
use super::tool_available;

/// Tesseract OCR backend.
pub struct TesseractBackend {
    language: String,
}

impl TesseractBackend {
    /// Create a backend for the given Tesseract language (e.g. "eng", "eng+hin").
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        tool_available("tesseract")
    }

    fn ocr_image(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::OcrFailed(format!(
                    "tesseract failed: {}",
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                OcrError::BackendNotAvailable("tesseract not found (install tesseract-ocr)".into()),
            ),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_english() {
        let backend = TesseractBackend::default();
        assert_eq!(backend.language(), "eng");
        assert_eq!(backend.name(), "tesseract");
    }

    #[test]
    fn missing_image_is_an_error() {
        let backend = TesseractBackend::default();
        if !backend.is_available() {
            return;
        }
        let result = backend.ocr_image(Path::new("/nonexistent/page-1.png"));
        assert!(result.is_err());
    }
}
