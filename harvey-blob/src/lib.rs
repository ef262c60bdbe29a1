#![deny(missing_docs)]
//! # harvey-blob — durable YAML blob storage (C9)
//!
//! Append-once, delete-by-id storage for uploaded pricing YAML, backed
//! by a local filesystem directory (`blob_store/{id}.yaml`). Durability
//! is pluggable behind the [`BlobStore`] trait; [`FsBlobStore`] is the
//! primary backend, grounded on the state-store layout `neuron-state-fs`
//! uses for its on-disk entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use harvey_types::BlobId;

/// Default maximum blob size: 1 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: usize = 1024 * 1024;

/// MIME types accepted by [`FsBlobStore::put`].
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/yaml", "text/yaml", "text/plain"];

/// Errors from blob storage operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BlobError {
    /// The blob exceeds the configured maximum size.
    #[error("blob too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the rejected payload, in bytes.
        size: usize,
        /// Configured maximum, in bytes.
        limit: usize,
    },

    /// The supplied content type isn't in [`ALLOWED_MIME_TYPES`].
    #[error("unsupported content type: {0}")]
    UnsupportedMimeType(String),

    /// No blob exists for the given id.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// The underlying store failed to read or write.
    #[error("blob store io error: {0}")]
    Io(String),
}

/// Durable storage for uploaded YAML artifacts, keyed by opaque id.
///
/// Implementations must give reads unlocked concurrent access while
/// serialising writes per id: an exclusive write lock per id, with
/// reads left unlocked.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under a freshly minted id and return it.
    async fn put(&self, content: String, mime_type: &str) -> Result<BlobId, BlobError>;

    /// Fetch the raw YAML for `id`, if it still exists.
    async fn get(&self, id: &BlobId) -> Result<String, BlobError>;

    /// Remove the blob for `id`. Idempotent: deleting a missing id is
    /// not an error, matching the facade's `DELETE /pricing/{id}` → 204
    /// contract regardless of prior state.
    async fn delete(&self, id: &BlobId) -> Result<(), BlobError>;
}

/// Filesystem-backed [`BlobStore`]. Each blob lives at
/// `{root}/{id}.yaml`, written as plain UTF-8.
pub struct FsBlobStore {
    root: PathBuf,
    max_size_bytes: usize,
    // One lock per in-flight id keeps writes to the same id serialised
    // without blocking unrelated ids or any reads.
    write_locks: Mutex<std::collections::HashMap<String, Arc<Mutex<()>>>>,
}

impl FsBlobStore {
    /// Open (creating if necessary) a blob store rooted at `root`, using
    /// the default 1 MiB size limit.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        Self::open_with_limit(root, DEFAULT_MAX_SIZE_BYTES).await
    }

    /// Open a blob store with a custom maximum blob size.
    pub async fn open_with_limit(
        root: impl Into<PathBuf>,
        max_size_bytes: usize,
    ) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Self {
            root,
            max_size_bytes,
            write_locks: Mutex::new(std::collections::HashMap::new()),
        })
    }

    fn path_for(&self, id: &BlobId) -> PathBuf {
        self.root.join(format!("{}.yaml", id.as_str()))
    }

    async fn lock_for(&self, id: &BlobId) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn validate_mime(mime_type: &str) -> Result<(), BlobError> {
    if ALLOWED_MIME_TYPES.contains(&mime_type) {
        Ok(())
    } else {
        Err(BlobError::UnsupportedMimeType(mime_type.to_string()))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, content: String, mime_type: &str) -> Result<BlobId, BlobError> {
        validate_mime(mime_type)?;
        if content.len() > self.max_size_bytes {
            return Err(BlobError::TooLarge {
                size: content.len(),
                limit: self.max_size_bytes,
            });
        }

        let id = BlobId::new(harvey_types::new_opaque_id());
        let lock = self.lock_for(&id).await;
        let _guard = lock.lock().await;

        let path = self.path_for(&id);
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;
        tracing::debug!(blob_id = %id, bytes = content.len(), "blob stored");
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<String, BlobError> {
        let path = self.path_for(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(id.clone()))
            }
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    async fn delete(&self, id: &BlobId) -> Result<(), BlobError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(blob_id = %id, "blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }
}

/// Resolve the blob id embedded in a `/static/{id}` or `/pricing/{id}`
/// path segment back into a [`BlobId`], rejecting path traversal.
pub fn parse_blob_id(raw: &str) -> Result<BlobId, BlobError> {
    if raw.is_empty() || raw.contains(['/', '\\']) || raw == "." || raw == ".." {
        return Err(BlobError::Io(format!("invalid blob id: {raw}")));
    }
    Ok(BlobId::new(raw))
}

/// The on-disk filename a blob id would be stored under, for callers
/// (e.g. `GET /static/{id}`) that need to reason about the layout
/// without holding a store handle.
pub fn blob_filename(id: &BlobId) -> String {
    format!("{}.yaml", id.as_str())
}

/// Convenience constructor for the standard layout: a `blob_store`
/// directory under `base_dir`.
pub async fn open_default_layout(base_dir: impl AsRef<Path>) -> Result<FsBlobStore, BlobError> {
    FsBlobStore::open(base_dir.as_ref().join("blob_store")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (FsBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let (store, _dir) = temp_store().await;
        let id = store
            .put("features: []\n".to_string(), "application/yaml")
            .await
            .unwrap();

        let content = store.get(&id).await.unwrap();
        assert_eq!(content, "features: []\n");

        store.delete(&id).await.unwrap();
        let err = store.get(&id).await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_of_missing_id_is_not_an_error() {
        let (store, _dir) = temp_store().await;
        let id = BlobId::new("never-existed");
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_oversized_blob() {
        let (store, _dir) = FsBlobStore::open_with_limit(tempfile::tempdir().unwrap().path(), 4)
            .await
            .map(|s| (s, ()))
            .unwrap();
        let err = store
            .put("way too long".to_string(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn rejects_unsupported_mime_type() {
        let (store, _dir) = temp_store().await;
        let err = store
            .put("<xml/>".to_string(), "application/xml")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::UnsupportedMimeType(_)));
    }

    #[tokio::test]
    async fn each_put_gets_a_distinct_id() {
        let (store, _dir) = temp_store().await;
        let a = store.put("a".to_string(), "text/plain").await.unwrap();
        let b = store.put("b".to_string(), "text/plain").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_blob_id_rejects_path_traversal() {
        assert!(parse_blob_id("../etc/passwd").is_err());
        assert!(parse_blob_id("..").is_err());
        assert!(parse_blob_id("").is_err());
        assert!(parse_blob_id("abc-123").is_ok());
    }
}
