use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_path, BlobError, BlobStore};
use crate::sanitize::redact_path;

/// Serves blobs from a directory tree. Blob paths are relative to `root`.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        validate_path(path)?;
        let full_path = self.root.join(path);

        let bytes = tokio::fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound {
                    path: path.to_string(),
                }
            } else {
                BlobError::Io {
                    path: path.to_string(),
                    source: e,
                }
            }
        })?;

        if bytes.is_empty() {
            return Err(BlobError::Empty {
                path: path.to_string(),
            });
        }

        tracing::debug!(
            file = %redact_path(&full_path),
            bytes = bytes.len(),
            "Fetched blob from filesystem"
        );
        Ok(bytes)
    }
}
