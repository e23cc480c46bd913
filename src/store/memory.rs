//! In-memory stores.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_transition, BlobStore, ClaimStore, PolicyLookup, StoreError};
use crate::models::{Claim, ClaimPatch, ClaimStatus};

/// Claim store held in memory. Insertion order is the store order.
#[derive(Default)]
pub struct MemoryClaimStore {
    claims: RwLock<Vec<Claim>>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `claims`.
    pub fn with_claims(claims: impl IntoIterator<Item = Claim>) -> Self {
        Self {
            claims: RwLock::new(claims.into_iter().collect()),
        }
    }

    /// Snapshot of every stored claim.
    pub async fn all(&self) -> Vec<Claim> {
        self.claims.read().await.clone()
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn get(&self, claim_id: &str) -> Result<Option<Claim>, StoreError> {
        let claims = self.claims.read().await;
        Ok(claims.iter().find(|c| c.id == claim_id).cloned())
    }

    async fn update(&self, claim_id: &str, patch: ClaimPatch) -> Result<(), StoreError> {
        let mut claims = self.claims.write().await;
        let claim = claims
            .iter_mut()
            .find(|c| c.id == claim_id)
            .ok_or_else(|| StoreError::NotFound(claim_id.to_string()))?;
        if let Some(next) = patch.status {
            check_transition(claim_id, claim.status, next)?;
        }
        patch.apply(claim);
        Ok(())
    }

    async fn find(&self, status: ClaimStatus) -> Result<Vec<String>, StoreError> {
        let claims = self.claims.read().await;
        Ok(claims
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.id.clone())
            .collect())
    }

    async fn insert(&self, claim: Claim) -> Result<(), StoreError> {
        let mut claims = self.claims.write().await;
        if claims.iter().any(|c| c.id == claim.id) {
            return Err(StoreError::AlreadyExists(claim.id));
        }
        claims.push(claim);
        Ok(())
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Claim>, StoreError> {
        let claims = self.claims.read().await;
        let mut owned: Vec<Claim> = claims
            .iter()
            .filter(|c| c.belongs_to(user_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

/// Blob store held in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, path: impl Into<String>, content: Vec<u8>) {
        self.blobs.write().await.insert(path.into(), content);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn upload(&self, path: &str, content: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .write()
            .await
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }
}

/// Policy wording held in memory.
#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: HashMap<String, String>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.policies.insert(policy_id.into(), text.into());
        self
    }
}

#[async_trait]
impl PolicyLookup for MemoryPolicyStore {
    async fn policy_text(&self, policy_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.policies.get(policy_id).cloned())
    }
}
