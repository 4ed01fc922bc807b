//! # Payment Slip Storage
//!
//! Payment-proof files are persisted *before* the order row is written, so
//! the order only ever references a file that durably exists. If the
//! transaction later aborts, the stored file is orphaned: harmless, and
//! cleaned up out of band.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Slip storage failure. Surfaces as a rejected checkout; nothing has been
/// written to the database yet when it occurs.
#[derive(Debug, Error)]
pub enum SlipError {
    #[error("slip storage failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Where payment-proof files go. Seam for tests and for swapping the
/// filesystem for object storage later.
#[async_trait]
pub trait SlipStore: Send + Sync {
    /// Persists the file and returns the durable reference stored on the
    /// order row.
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String, SlipError>;
}

/// Filesystem-backed slip store. Files land under `base_dir` with a
/// uuid-prefixed name, so client-chosen names can never collide or
/// traverse out of the directory.
#[derive(Debug, Clone)]
pub struct FsSlipStore {
    base_dir: PathBuf,
}

impl FsSlipStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FsSlipStore {
            base_dir: base_dir.into(),
        }
    }

    fn sanitize(file_name: &str) -> String {
        let name: String = file_name
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        if name.is_empty() {
            "slip".to_string()
        } else {
            name
        }
    }
}

#[async_trait]
impl SlipStore for FsSlipStore {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String, SlipError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let stored_name = format!("{}-{}", Uuid::new_v4(), Self::sanitize(file_name));
        let path = self.base_dir.join(&stored_name);

        tokio::fs::write(&path, bytes).await?;
        debug!(slip = %stored_name, size = bytes.len(), "Stored payment slip");

        Ok(stored_name)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_sanitizes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSlipStore::new(dir.path());

        let stored = store
            .store("../../etc/passwd receipt.png", b"png-bytes")
            .await
            .unwrap();

        assert!(!stored.contains('/'));
        assert!(stored.ends_with("passwd_receipt.png"));

        let bytes = tokio::fs::read(dir.path().join(&stored)).await.unwrap();
        assert_eq!(bytes, b"png-bytes");
    }
}
