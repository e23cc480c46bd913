//! Claim record and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuditResult, ExtractedData};

/// Processing status of a claim.
///
/// The string forms are persisted and read by intake and listing, so they
/// must not change without a data migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Submitted and waiting for a worker.
    Queued,
    /// A processing attempt is running.
    TextExtraction,
    /// Extraction and normalization succeeded.
    Completed,
    /// The latest attempt (or all attempts) failed.
    Failed,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 4] = [
        Self::Queued,
        Self::TextExtraction,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::TextExtraction => "text_extraction",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "text_extraction" => Some(Self::TextExtraction),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Status writes the stores accept.
    ///
    /// Any claim may start a new attempt, which is how retries and explicit
    /// re-processing work. Only a running attempt can complete. A claim can
    /// be failed before its attempt starts (no file, crashed worker) but a
    /// completed claim is never failed afterwards, and nothing returns a
    /// claim to `Queued`.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        match (self, next) {
            (_, Queued) => false,
            (_, TextExtraction) => true,
            (TextExtraction, Completed) => true,
            (Completed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    /// Statuses from which a claim may move to `next`.
    pub fn predecessors(next: ClaimStatus) -> Vec<ClaimStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted claim document and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    /// Original upload filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Blob store path of the uploaded PDF.
    #[serde(default)]
    pub file_path: Option<String>,
    pub status: ClaimStatus,
    /// User id of the submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Policy wording attached at intake.
    #[serde(default)]
    pub policy_text: Option<String>,
    #[serde(default)]
    pub extracted_data: Option<ExtractedData>,
    #[serde(default)]
    pub audit_result: Option<AuditResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    /// Create a queued claim pointing at an uploaded blob.
    pub fn new(id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: None,
            file_path: Some(file_path.into()),
            status: ClaimStatus::Queued,
            uploaded_by: None,
            policy_id: None,
            policy_text: None,
            extracted_data: None,
            audit_result: None,
            error_message: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_owner(mut self, user_id: impl Into<String>) -> Self {
        self.uploaded_by = Some(user_id.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_policy(mut self, policy_id: Option<String>, policy_text: Option<String>) -> Self {
        self.policy_id = policy_id;
        self.policy_text = policy_text;
        self
    }

    /// Whether this claim was submitted by `user_id`.
    pub fn belongs_to(&self, user_id: &str) -> bool {
        self.uploaded_by.as_deref() == Some(user_id)
    }
}

/// A partial update merged atomically into a stored claim.
///
/// Fields left as `None` are untouched. Nullable claim fields use a nested
/// option so a patch can clear them (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimPatch {
    pub status: Option<ClaimStatus>,
    pub extracted_data: Option<ExtractedData>,
    pub audit_result: Option<AuditResult>,
    pub error_message: Option<Option<String>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ClaimPatch {
    pub fn status(status: ClaimStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_extracted_data(mut self, data: ExtractedData) -> Self {
        self.extracted_data = Some(data);
        self
    }

    pub fn with_audit_result(mut self, result: AuditResult) -> Self {
        self.audit_result = Some(result);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn processed_now(mut self) -> Self {
        self.processed_at = Some(Utc::now());
        self
    }

    /// Merge this patch into `claim`.
    pub fn apply(self, claim: &mut Claim) {
        if let Some(status) = self.status {
            claim.status = status;
        }
        if let Some(data) = self.extracted_data {
            claim.extracted_data = Some(data);
        }
        if let Some(result) = self.audit_result {
            claim.audit_result = Some(result);
        }
        if let Some(message) = self.error_message {
            claim.error_message = message;
        }
        if let Some(at) = self.processed_at {
            claim.processed_at = Some(at);
        }
    }
}
