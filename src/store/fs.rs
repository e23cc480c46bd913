//! Document and policy files under a data directory.
//!
//! Layout:
//! ```text
//! {root}/blobs/{user_id}/{uuid}.pdf
//! {root}/policies/{policy_id}.txt
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_key, BlobStore, PolicyLookup, StoreError};

/// Blobs stored as plain files under `{root}/blobs`.
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = root.as_ref().join("blobs");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn blob_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_key(path)?;
        Ok(self.dir.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let full = self.blob_path(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, path: &str, content: &[u8]) -> Result<(), StoreError> {
        let full = self.blob_path(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }
}

/// Policy wording stored as `{root}/policies/{policy_id}.txt`.
pub struct FsPolicyStore {
    dir: PathBuf,
}

impl FsPolicyStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join("policies"),
        }
    }
}

#[async_trait]
impl PolicyLookup for FsPolicyStore {
    async fn policy_text(&self, policy_id: &str) -> Result<Option<String>, StoreError> {
        if policy_id.contains('/') {
            return Err(StoreError::InvalidKey(policy_id.to_string()));
        }
        validate_key(policy_id)?;
        let path = self.dir.join(format!("{policy_id}.txt"));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
