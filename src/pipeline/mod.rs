//! Claim processing pipeline: one attempt, the retry controller around it,
//! the queued-claim sweeper and the background dispatcher.

mod dispatcher;
mod processor;
mod retry;
mod sweeper;

use thiserror::Error;

use crate::store::StoreError;

pub use dispatcher::{ClaimDispatcher, DeadLetter, DeadLetterLog, DispatchOutcome};
pub use processor::ClaimProcessor;
pub use retry::{backoff_delay, JobRunner, RetryPolicy, RunOutcome, Sleeper, TokioSleeper};
pub use sweeper::{BatchSweeper, SweepReport};

/// Why a processing attempt failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Claim {0} not found")]
    ClaimNotFound(String),

    #[error("Claim {0} has no file_path")]
    MissingFilePath(String),

    #[error("Document {path} is not a PDF (detected {detected})")]
    NotPdf { path: String, detected: String },

    #[error("Failed to download {path}: {source}")]
    Download {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Failures that another attempt cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::ClaimNotFound(_)
                | Self::MissingFilePath(_)
                | Self::NotPdf { .. }
                | Self::Store(StoreError::InvalidTransition { .. })
        )
    }
}
