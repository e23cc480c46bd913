//! Claim submission: validate an uploaded PDF, store it, and create the
//! queued claim record the pipeline picks up.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::Claim;
use crate::store::{BlobStore, ClaimStore, PolicyLookup, StoreError};

/// Default upload size limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Only PDF files are supported (detected {0})")]
    NotPdf(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("File is empty")]
    Empty,

    #[error("Invalid user id: {0}")]
    InvalidUser(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// A document being submitted for processing.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: String,
    pub file_name: String,
    pub content: Vec<u8>,
    pub policy_id: Option<String>,
}

impl Submission {
    pub fn new(user_id: impl Into<String>, file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            user_id: user_id.into(),
            file_name: file_name.into(),
            content,
            policy_id: None,
        }
    }

    pub fn with_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }
}

pub struct ClaimIntake {
    claims: Arc<dyn ClaimStore>,
    blobs: Arc<dyn BlobStore>,
    policies: Option<Arc<dyn PolicyLookup>>,
    max_upload_bytes: usize,
}

impl ClaimIntake {
    pub fn new(claims: Arc<dyn ClaimStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            claims,
            blobs,
            policies: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_policy_lookup(mut self, policies: Arc<dyn PolicyLookup>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Store the document and create a `queued` claim for it.
    pub async fn submit(&self, submission: Submission) -> Result<Claim, IntakeError> {
        let Submission {
            user_id,
            file_name,
            content,
            policy_id,
        } = submission;

        if user_id.trim().is_empty() || user_id.contains(['/', '\\']) || user_id.starts_with('.') {
            return Err(IntakeError::InvalidUser(user_id));
        }
        if content.is_empty() {
            return Err(IntakeError::Empty);
        }
        if content.len() > self.max_upload_bytes {
            return Err(IntakeError::TooLarge {
                size: content.len(),
                limit: self.max_upload_bytes,
            });
        }
        match infer::get(&content) {
            Some(kind) if kind.mime_type() == PDF_MIME => {}
            Some(kind) => return Err(IntakeError::NotPdf(kind.mime_type().to_string())),
            None => return Err(IntakeError::NotPdf("unknown".to_string())),
        }

        let claim_id = Uuid::new_v4().to_string();
        let file_path = format!("{}/{}.pdf", user_id, Uuid::new_v4());
        self.blobs.upload(&file_path, &content).await?;

        let policy_text = match policy_id.as_deref() {
            Some(id) => self.lookup_policy(id).await,
            None => None,
        };

        let claim = Claim::new(claim_id, file_path)
            .with_owner(user_id)
            .with_file_name(file_name)
            .with_policy(policy_id, policy_text);
        self.claims.insert(claim.clone()).await?;

        info!(
            "Claim {} queued ({} bytes, {})",
            claim.id,
            content.len(),
            claim.file_path.as_deref().unwrap_or_default()
        );
        Ok(claim)
    }

    async fn lookup_policy(&self, policy_id: &str) -> Option<String> {
        let policies = self.policies.as_ref()?;
        match policies.policy_text(policy_id).await {
            Ok(Some(text)) => Some(text),
            Ok(None) => {
                warn!("Unknown policy {}, continuing without policy text", policy_id);
                None
            }
            Err(e) => {
                warn!("Policy lookup failed for {}: {}", policy_id, e);
                None
            }
        }
    }
}
