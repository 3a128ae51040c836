use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::registry::{BlobStore, BoxFuture};

/// Blobs kept as files named by their storage id under one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage id to a path inside the root.
    ///
    /// Ids that could escape the directory resolve to `None`.
    fn blob_path(&self, storage_id: &str) -> Option<PathBuf> {
        let valid = !storage_id.is_empty()
            && storage_id != "."
            && storage_id != ".."
            && !storage_id.contains(['/', '\\', '\0']);
        valid.then(|| self.root.join(storage_id))
    }

    /// Write a blob file.
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable storage id or if the write fails.
    pub async fn put(&self, storage_id: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(storage_id).ok_or_else(|| {
            std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid storage id: {storage_id}"),
            )
        })?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, storage_id: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        let path = self.blob_path(storage_id);
        Box::pin(async move {
            let Some(path) = path else {
                tracing::warn!("rejected storage id outside blob root");
                return Ok(None);
            };
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}
