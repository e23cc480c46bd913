//! Persistence seams: claim records, document blobs and policy wording.
//!
//! The pipeline only talks to these traits. In-memory implementations back
//! the tests. The CLI keeps claim records in SQLite and documents and policy
//! wording as plain files under the data directory.

mod fs;
mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Claim, ClaimPatch, ClaimStatus};

pub use fs::{FsBlobStore, FsPolicyStore};
pub use memory::{MemoryBlobStore, MemoryClaimStore, MemoryPolicyStore};
pub use sqlite::SqliteClaimStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Claim not found: {0}")]
    NotFound(String),

    #[error("Claim already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Claim {claim_id} cannot move from {from} to {to}")]
    InvalidTransition {
        claim_id: String,
        from: ClaimStatus,
        to: ClaimStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Key-value record store for claims with atomic per-record field updates.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Fetch a claim, `None` if it does not exist.
    async fn get(&self, claim_id: &str) -> Result<Option<Claim>, StoreError>;

    /// Merge `patch` into the stored record. Last writer wins per field.
    ///
    /// A status change that [`ClaimStatus::can_transition_to`] forbids fails
    /// with [`StoreError::InvalidTransition`] and writes nothing.
    async fn update(&self, claim_id: &str, patch: ClaimPatch) -> Result<(), StoreError>;

    /// Ids of claims in `status`, in store order (oldest first).
    async fn find(&self, status: ClaimStatus) -> Result<Vec<String>, StoreError>;

    /// Create a new record.
    async fn insert(&self, claim: Claim) -> Result<(), StoreError>;

    /// Claims submitted by `user_id`, newest first.
    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Claim>, StoreError>;
}

/// Byte-addressable document storage keyed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    async fn upload(&self, path: &str, content: &[u8]) -> Result<(), StoreError>;
}

/// Lookup of policy wording by policy id.
#[async_trait]
pub trait PolicyLookup: Send + Sync {
    async fn policy_text(&self, policy_id: &str) -> Result<Option<String>, StoreError>;
}

/// Check a status write against the claim's current status.
pub(crate) fn check_transition(
    claim_id: &str,
    from: ClaimStatus,
    to: ClaimStatus,
) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            claim_id: claim_id.to_string(),
            from,
            to,
        })
    }
}

/// Reject keys that could escape a storage root.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}
