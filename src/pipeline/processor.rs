//! One processing attempt: download, extract, normalize, persist.

use std::sync::Arc;

use tracing::{debug, info};

use super::PipelineError;
use crate::models::{ClaimPatch, ClaimStatus, ExtractedData};
use crate::normalize::ClaimNormalizer;
use crate::ocr::TextExtractor;
use crate::store::{BlobStore, ClaimStore};

const PDF_MIME: &str = "application/pdf";

pub struct ClaimProcessor {
    claims: Arc<dyn ClaimStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<TextExtractor>,
    normalizer: Arc<ClaimNormalizer>,
}

impl ClaimProcessor {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<TextExtractor>,
        normalizer: Arc<ClaimNormalizer>,
    ) -> Self {
        Self {
            claims,
            blobs,
            extractor,
            normalizer,
        }
    }

    pub fn claims(&self) -> &Arc<dyn ClaimStore> {
        &self.claims
    }

    /// Run one attempt. On success the claim is `completed` with its
    /// extracted data persisted and any earlier error cleared.
    pub async fn attempt(&self, claim_id: &str) -> Result<ExtractedData, PipelineError> {
        let claim = self
            .claims
            .get(claim_id)
            .await?
            .ok_or_else(|| PipelineError::ClaimNotFound(claim_id.to_string()))?;
        let file_path = claim
            .file_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PipelineError::MissingFilePath(claim_id.to_string()))?;

        self.claims
            .update(claim_id, ClaimPatch::status(ClaimStatus::TextExtraction))
            .await?;

        debug!("Downloading {} for claim {}", file_path, claim_id);
        let bytes = self
            .blobs
            .download(&file_path)
            .await
            .map_err(|source| PipelineError::Download {
                path: file_path.clone(),
                source,
            })?;
        ensure_pdf(&file_path, &bytes)?;

        let extraction = self.extractor.extract_bytes(bytes).await;
        if !extraction.success {
            return Err(PipelineError::Extraction(
                extraction
                    .error
                    .unwrap_or_else(|| extraction.extraction_method.to_string()),
            ));
        }

        let structured = self.normalizer.normalize(&extraction.raw_text).await;
        let data = ExtractedData::new(&extraction, structured);

        self.claims
            .update(
                claim_id,
                ClaimPatch::status(ClaimStatus::Completed)
                    .with_extracted_data(data.clone())
                    .clear_error()
                    .processed_now(),
            )
            .await?;

        info!(
            "Claim {} extracted: {} chars via {}, confidence {}",
            claim_id,
            data.raw_text.len(),
            data.extraction_method,
            data.structured_data
                .as_ref()
                .map(|s| s.extraction_confidence.as_str())
                .unwrap_or("none")
        );
        Ok(data)
    }
}

/// Reject blobs whose content is recognisably not a PDF.
fn ensure_pdf(path: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    match infer::get(bytes) {
        Some(kind) if kind.mime_type() != PDF_MIME => Err(PipelineError::NotPdf {
            path: path.to_string(),
            detected: kind.mime_type().to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_check_only_rejects_known_other_types() {
        assert!(ensure_pdf("a.pdf", b"%PDF-1.7\n...").is_ok());
        // unrecognised content is left for the extractor to judge
        assert!(ensure_pdf("a.pdf", b"plain bytes").is_ok());

        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let err = ensure_pdf("scan.png", &png).unwrap_err();
        assert!(matches!(err, PipelineError::NotPdf { .. }));
    }
}
